use super::NanonisClient;
use crate::config::Limits;
use crate::error::NanonisError;
use crate::nanonis::transport::Transport;
use log::info;

impl<T: Transport> NanonisClient<T> {
    /// Get the calibrated X, Y and Z ranges of the piezo scanner in meters.
    pub fn piezo_range_get(&self) -> Result<[f32; 3], NanonisError> {
        let result = self.call("piezo_range_get", &[])?;
        if result.len() < 3 {
            return Err(NanonisError::Protocol(
                "Invalid piezo range response".to_string(),
            ));
        }
        Ok([
            result[0].as_f32()?,
            result[1].as_f32()?,
            result[2].as_f32()?,
        ])
    }

    /// Query the piezo ranges and derive the scanner limits from them.
    pub fn apply_piezo_limits(&self) -> Result<Limits, NanonisError> {
        let range = self.piezo_range_get()?;
        let limits = self.limits().from_piezo_range(range);
        info!(
            "Scanner limits from piezo range: x={:e} y={:e} z={:?}",
            limits.x_scanner, limits.y_scanner, limits.z_scanner
        );
        self.set_limits(limits);
        Ok(limits)
    }
}

#[cfg(test)]
mod tests {
    use crate::nanonis::client::{ConnectionConfig, NanonisClient};
    use crate::nanonis::protocol::testing::response_frame;
    use crate::nanonis::transport::mock::MockTransport;
    use crate::types::{NanonisValue, TypeTag};

    #[test]
    fn test_apply_piezo_limits() {
        let incoming = response_frame(
            "Piezo.RangeGet",
            &[
                (TypeTag::F32, NanonisValue::F32(4e-6)),
                (TypeTag::F32, NanonisValue::F32(4e-6)),
                (TypeTag::F32, NanonisValue::F32(1e-6)),
            ],
            0,
            "",
        );
        let client =
            NanonisClient::with_transport(MockTransport::new(incoming), ConnectionConfig::default());

        let limits = client.apply_piezo_limits().unwrap();
        assert_eq!(client.limits(), limits);
        assert!((limits.x_scanner - 2e-6).abs() < 1e-12);
        assert!(client.limits().z_scanner.is_some());
    }
}
