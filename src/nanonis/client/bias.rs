use super::{Arg, NanonisClient};
use crate::error::NanonisError;
use crate::nanonis::transport::Transport;

impl<T: Transport> NanonisClient<T> {
    /// Set the bias voltage applied to the scanning probe tip.
    ///
    /// This corresponds to the Nanonis `Bias.Set` command. The voltage can
    /// be a number in volts or an engineering literal such as `"-200m"`.
    ///
    /// # Errors
    /// Returns `NanonisError` if:
    /// - The voltage is outside the configured bias limit
    /// - The command fails or communication times out
    ///
    /// # Examples
    /// ```no_run
    /// use nanonis_control::NanonisClient;
    ///
    /// let client = NanonisClient::new("127.0.0.1", 6501)?;
    ///
    /// client.set_bias(1.5)?;
    /// client.set_bias("10m")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn set_bias(&self, voltage: impl Into<Arg>) -> Result<(), NanonisError> {
        self.call("bias_set", &[voltage.into()])?;
        Ok(())
    }

    /// Get the current bias voltage applied to the scanning probe tip.
    ///
    /// This corresponds to the Nanonis `Bias.Get` command.
    pub fn get_bias(&self) -> Result<f32, NanonisError> {
        let result = self.call("bias_get", &[])?;
        match result.first() {
            Some(value) => Ok(value.as_f32()?),
            None => Err(NanonisError::Protocol("No bias value returned".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::nanonis::client::{ConnectionConfig, NanonisClient};
    use crate::nanonis::protocol::testing::response_frame;
    use crate::nanonis::transport::mock::MockTransport;
    use crate::NanonisError;

    #[test]
    fn test_set_bias_rejects_out_of_range_without_sending() {
        let transport = MockTransport::new(Vec::new());
        let written = transport.written.clone();
        let client = NanonisClient::with_transport(transport, ConnectionConfig::default());

        assert!(matches!(
            client.set_bias(12.0f64),
            Err(NanonisError::InvalidValue(_))
        ));
        assert!(written.lock().is_empty());
    }

    #[test]
    fn test_set_bias_accepts_literal() {
        let transport = MockTransport::new(response_frame("Bias.Set", &[], 0, ""));
        let written = transport.written.clone();
        let client = NanonisClient::with_transport(transport, ConnectionConfig::default());

        client.set_bias("-500m").unwrap();
        assert_eq!(&written.lock()[40..], &(-0.5f32).to_be_bytes());
    }
}
