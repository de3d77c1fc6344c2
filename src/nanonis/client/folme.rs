use super::{Arg, NanonisClient};
use crate::error::NanonisError;
use crate::nanonis::transport::Transport;
use crate::types::Position;

impl<T: Transport> NanonisClient<T> {
    /// Get the current x-y position
    pub fn folme_xy_pos_get(&self, wait_for_newest_data: bool) -> Result<Position, NanonisError> {
        let result = self.call("tip_xy_get", &[wait_for_newest_data.into()])?;

        if result.len() >= 2 {
            Ok(Position {
                x: result[0].as_f64()?,
                y: result[1].as_f64()?,
            })
        } else {
            Err(NanonisError::Protocol(
                "Invalid position response".to_string(),
            ))
        }
    }

    /// Move the tip to an x-y position, in meters or as engineering literals.
    pub fn folme_xy_pos_set(
        &self,
        x: impl Into<Arg>,
        y: impl Into<Arg>,
        wait_until_finished: bool,
    ) -> Result<(), NanonisError> {
        self.call(
            "tip_xy_set",
            &[x.into(), y.into(), wait_until_finished.into()],
        )?;
        Ok(())
    }

    pub fn folme_speed_set(&self, speed: f32, custom_speed: bool) -> Result<(), NanonisError> {
        self.call("folme_speed_set", &[speed.into(), custom_speed.into()])?;
        Ok(())
    }
}
