use super::{Arg, NanonisClient};
use crate::error::NanonisError;
use crate::nanonis::transport::Transport;
use std::time::Duration;

impl<T: Transport> NanonisClient<T> {
    /// Switch the Z-Controller on or off.
    pub fn z_ctrl_on_off_set(&self, controller_on: bool) -> Result<(), NanonisError> {
        self.call("z_ctrl_on_off_set", &[controller_on.into()])?;
        Ok(())
    }

    /// Get the real-time status of the Z-Controller.
    pub fn z_ctrl_on_off_get(&self) -> Result<bool, NanonisError> {
        let result = self.call("z_ctrl_on_off_get", &[])?;
        match result.first() {
            Some(value) => Ok(value.as_u32()? == 1),
            None => Err(NanonisError::Protocol(
                "No Z-controller status returned".to_string(),
            )),
        }
    }

    /// Set the Z position of the tip.
    ///
    /// The Z-controller must be switched off for the position to change.
    pub fn z_pos_set(&self, z_position: impl Into<Arg>) -> Result<(), NanonisError> {
        self.call("tip_z_set", &[z_position.into()])?;
        Ok(())
    }

    /// Get the current Z position of the tip in meters.
    pub fn z_pos_get(&self) -> Result<f32, NanonisError> {
        let result = self.call("tip_z_get", &[])?;
        match result.first() {
            Some(value) => Ok(value.as_f32()?),
            None => Err(NanonisError::Protocol("No Z position returned".to_string())),
        }
    }

    /// Withdraw the tip, optionally waiting up to `timeout` for completion.
    pub fn z_ctrl_withdraw(&self, wait: bool, timeout: Duration) -> Result<(), NanonisError> {
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        self.call("z_ctrl_withdraw", &[wait.into(), timeout_ms.into()])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Limits;
    use crate::nanonis::client::{ConnectionConfig, NanonisClient};
    use crate::nanonis::protocol::testing::response_frame;
    use crate::nanonis::transport::mock::MockTransport;
    use crate::types::{NanonisValue, TypeTag};
    use crate::NanonisError;

    #[test]
    fn test_z_position() {
        let incoming = response_frame(
            "ZCtrl.ZPosGet",
            &[(TypeTag::F32, NanonisValue::F32(-1e-10))],
            0,
            "",
        );
        let client =
            NanonisClient::with_transport(MockTransport::new(incoming), ConnectionConfig::default());
        assert_eq!(client.z_pos_get().unwrap(), -1e-10);
    }

    #[test]
    fn test_z_limit_after_piezo_range() {
        let client =
            NanonisClient::with_transport(MockTransport::new(Vec::new()), ConnectionConfig::default());
        client.set_limits(Limits::default().from_piezo_range([2e-6, 2e-6, 1e-6]));
        assert!(matches!(
            client.z_pos_set("-600n"),
            Err(NanonisError::InvalidValue(_))
        ));
    }
}
