//! Named commands with fixed type signatures.
//!
//! Each entry maps a friendly name onto a Nanonis command and the compact
//! type codes of its arguments and return values. Numeric arguments may be
//! given as engineering literals (`"-200p"`) and are checked against the
//! session's [`Limits`] where the entry names one.

use super::NanonisClient;
use crate::config::Limits;
use crate::error::NanonisError;
use crate::nanonis::protocol::Command;
use crate::nanonis::transport::Transport;
use crate::types::{NanonisValue, TypeTag, parse_type_codes};
use crate::units::parse_engineering;
use log::debug;

/// Which safety bound applies to an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Bias,
    XScanner,
    YScanner,
    ZScanner,
    Setpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub code: &'static str,
    pub limit: Option<LimitKind>,
}

const fn arg(name: &'static str, code: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        code,
        limit: None,
    }
}

const fn bounded(name: &'static str, code: &'static str, limit: LimitKind) -> ArgSpec {
    ArgSpec {
        name,
        code,
        limit: Some(limit),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub command: &'static str,
    pub args: &'static [ArgSpec],
    pub returns: &'static [&'static str],
}

pub static CATALOG: &[CommandSpec] = &[
    CommandSpec {
        name: "bias_set",
        command: "Bias.Set",
        args: &[bounded("bias", "f", LimitKind::Bias)],
        returns: &[],
    },
    CommandSpec {
        name: "bias_get",
        command: "Bias.Get",
        args: &[],
        returns: &["f"],
    },
    CommandSpec {
        name: "tip_xy_set",
        command: "FolMe.XYPosSet",
        args: &[
            bounded("x", "d", LimitKind::XScanner),
            bounded("y", "d", LimitKind::YScanner),
            arg("wait", "I"),
        ],
        returns: &[],
    },
    CommandSpec {
        name: "tip_xy_get",
        command: "FolMe.XYPosGet",
        args: &[arg("wait", "I")],
        returns: &["d", "d"],
    },
    CommandSpec {
        name: "folme_speed_set",
        command: "FolMe.SpeedSet",
        args: &[arg("speed", "f"), arg("custom_speed", "I")],
        returns: &[],
    },
    CommandSpec {
        name: "folme_ps_on_off_set",
        command: "FolMe.PSOnOffSet",
        args: &[arg("status", "I")],
        returns: &[],
    },
    CommandSpec {
        name: "tip_z_set",
        command: "ZCtrl.ZPosSet",
        args: &[bounded("z", "f", LimitKind::ZScanner)],
        returns: &[],
    },
    CommandSpec {
        name: "tip_z_get",
        command: "ZCtrl.ZPosGet",
        args: &[],
        returns: &["f"],
    },
    CommandSpec {
        name: "z_ctrl_on_off_set",
        command: "ZCtrl.OnOffSet",
        args: &[arg("status", "I")],
        returns: &[],
    },
    CommandSpec {
        name: "z_ctrl_on_off_get",
        command: "ZCtrl.OnOffGet",
        args: &[],
        returns: &["I"],
    },
    CommandSpec {
        name: "z_ctrl_setpoint_set",
        command: "ZCtrl.SetpntSet",
        args: &[bounded("setpoint", "f", LimitKind::Setpoint)],
        returns: &[],
    },
    CommandSpec {
        name: "z_ctrl_setpoint_get",
        command: "ZCtrl.SetpntGet",
        args: &[],
        returns: &["f"],
    },
    CommandSpec {
        name: "z_ctrl_tip_lift_set",
        command: "ZCtrl.TipLiftSet",
        args: &[bounded("tip_lift", "f", LimitKind::ZScanner)],
        returns: &[],
    },
    CommandSpec {
        name: "z_ctrl_withdraw",
        command: "ZCtrl.Withdraw",
        args: &[arg("wait", "I"), arg("timeout_ms", "i")],
        returns: &[],
    },
    CommandSpec {
        name: "piezo_range_get",
        command: "Piezo.RangeGet",
        args: &[],
        returns: &["f", "f", "f"],
    },
    CommandSpec {
        name: "piezo_drift_comp_set",
        command: "Piezo.DriftCompSet",
        args: &[
            arg("status", "i"),
            arg("vx", "f"),
            arg("vy", "f"),
            arg("vz", "f"),
            arg("saturation_limit", "f"),
        ],
        returns: &[],
    },
    CommandSpec {
        name: "piezo_drift_comp_get",
        command: "Piezo.DriftCompGet",
        args: &[],
        returns: &["I", "f", "f", "f", "I", "I", "I", "f"],
    },
    CommandSpec {
        name: "scan_action",
        command: "Scan.Action",
        args: &[arg("action", "H"), arg("direction", "I")],
        returns: &[],
    },
    CommandSpec {
        name: "scan_frame_get",
        command: "Scan.FrameGet",
        args: &[],
        returns: &["f", "f", "f", "f", "f"],
    },
    CommandSpec {
        name: "scan_wait_end_of_scan",
        command: "Scan.WaitEndOfScan",
        args: &[arg("timeout_ms", "i")],
        returns: &["I", "I", "*-c"],
    },
    CommandSpec {
        name: "atom_track_ctrl_set",
        command: "AtomTrack.CtrlSet",
        args: &[arg("control", "H"), arg("status", "H")],
        returns: &[],
    },
    CommandSpec {
        name: "atom_track_status_get",
        command: "AtomTrack.StatusGet",
        args: &[arg("control", "H")],
        returns: &["H"],
    },
    CommandSpec {
        name: "atom_track_props_get",
        command: "AtomTrack.PropsGet",
        args: &[],
        // integral gain, frequency, amplitude, phase, switch off delay
        returns: &["f", "f", "f", "f", "f"],
    },
    CommandSpec {
        name: "current_get",
        command: "Current.Get",
        args: &[],
        returns: &["f"],
    },
    CommandSpec {
        name: "signal_val_get",
        command: "Signals.ValGet",
        args: &[arg("index", "i"), arg("wait", "I")],
        returns: &["f"],
    },
    CommandSpec {
        name: "signals_vals_get",
        command: "Signals.ValsGet",
        args: &[arg("indexes", "+*i"), arg("wait", "I")],
        returns: &["i", "*f"],
    },
];

/// Find a catalog entry by its friendly name
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}

/// Argument to a named command, resolved against the entry's type.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Number(f64),
    /// Number with optional SI prefix, or text for string parameters
    Literal(String),
    /// Already in the wire representation
    Value(NanonisValue),
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Number(value)
    }
}

impl From<f32> for Arg {
    fn from(value: f32) -> Self {
        Arg::Number(value as f64)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Number(value as f64)
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Number(value as f64)
    }
}

impl From<u16> for Arg {
    fn from(value: u16) -> Self {
        Arg::Number(value as f64)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Number(if value { 1.0 } else { 0.0 })
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Literal(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Literal(value)
    }
}

impl From<NanonisValue> for Arg {
    fn from(value: NanonisValue) -> Self {
        Arg::Value(value)
    }
}

impl From<Vec<i32>> for Arg {
    fn from(value: Vec<i32>) -> Self {
        Arg::Value(value.into())
    }
}

fn numeric_value(value: &NanonisValue) -> Option<f64> {
    match value {
        NanonisValue::I16(v) => Some(*v as f64),
        NanonisValue::I32(v) => Some(*v as f64),
        NanonisValue::U16(v) => Some(*v as f64),
        NanonisValue::U32(v) => Some(*v as f64),
        NanonisValue::F32(v) => Some(*v as f64),
        NanonisValue::F64(v) => Some(*v),
        _ => None,
    }
}

fn integral_in_range(name: &str, x: f64, min: f64, max: f64) -> Result<f64, NanonisError> {
    if !x.is_finite() || x.fract() != 0.0 || x < min || x > max {
        return Err(NanonisError::InvalidValue(format!(
            "{name}: {x} is not an integer in [{min}, {max}]"
        )));
    }
    Ok(x)
}

/// Convert a magnitude in base units to the wire type of an argument.
fn cast_number(name: &str, tag: &TypeTag, x: f64) -> Result<NanonisValue, NanonisError> {
    let value = match tag {
        TypeTag::F64 => NanonisValue::F64(x),
        TypeTag::F32 => {
            if x.is_finite() && x.abs() > f32::MAX as f64 {
                return Err(NanonisError::InvalidValue(format!(
                    "{name}: {x} overflows f32"
                )));
            }
            NanonisValue::F32(x as f32)
        }
        TypeTag::I16 => {
            NanonisValue::I16(integral_in_range(name, x, i16::MIN as f64, i16::MAX as f64)? as i16)
        }
        TypeTag::I32 => {
            NanonisValue::I32(integral_in_range(name, x, i32::MIN as f64, i32::MAX as f64)? as i32)
        }
        TypeTag::U16 => NanonisValue::U16(integral_in_range(name, x, 0.0, u16::MAX as f64)? as u16),
        TypeTag::U32 => NanonisValue::U32(integral_in_range(name, x, 0.0, u32::MAX as f64)? as u32),
        other => {
            return Err(NanonisError::Type(format!(
                "{name}: a number can't be sent as {other}"
            )))
        }
    };
    Ok(value)
}

/// Convert an argument to the wire representation of `tag`.
///
/// Literals are unit-parsed for numeric types and passed through for string
/// types. No limits are checked here.
pub fn resolve_value(name: &str, tag: &TypeTag, arg: &Arg) -> Result<NanonisValue, NanonisError> {
    match arg {
        Arg::Value(value) if value.matches(tag) => Ok(value.clone()),
        Arg::Value(value) => Err(NanonisError::Type(format!(
            "{name}: {value:?} does not match type {tag}"
        ))),
        Arg::Literal(text) if matches!(tag, TypeTag::String | TypeTag::CountedString) => {
            Ok(NanonisValue::String(text.clone()))
        }
        Arg::Literal(text) if tag.is_numeric() => cast_number(name, tag, parse_engineering(text)?),
        Arg::Literal(text) => Err(NanonisError::Type(format!(
            "{name}: '{text}' can't be sent as {tag}"
        ))),
        Arg::Number(x) => cast_number(name, tag, *x),
    }
}

impl CommandSpec {
    pub fn arg_types(&self) -> Result<Vec<TypeTag>, NanonisError> {
        self.args.iter().map(|a| a.code.parse()).collect()
    }

    pub fn return_types(&self) -> Result<Vec<TypeTag>, NanonisError> {
        parse_type_codes(self.returns)
    }

    fn resolve_arg(
        spec: &ArgSpec,
        tag: &TypeTag,
        arg: &Arg,
        limits: &Limits,
    ) -> Result<NanonisValue, NanonisError> {
        let value = resolve_value(spec.name, tag, arg)?;
        if let (Some(kind), Some(x)) = (spec.limit, numeric_value(&value)) {
            limits.check(kind, spec.name, x)?;
        }
        Ok(value)
    }

    /// Turn friendly arguments into a protocol command.
    pub fn resolve(&self, args: &[Arg], limits: &Limits) -> Result<Command, NanonisError> {
        if args.len() != self.args.len() {
            return Err(NanonisError::InvalidCommand(format!(
                "{} takes {} arguments ({}), got {}",
                self.name,
                self.args.len(),
                self.args
                    .iter()
                    .map(|a| a.name)
                    .collect::<Vec<_>>()
                    .join(", "),
                args.len()
            )));
        }

        let mut command = Command::new(self.command).returns(self.return_types()?);
        for ((spec, tag), arg) in self.args.iter().zip(self.arg_types()?).zip(args) {
            let value = Self::resolve_arg(spec, &tag, arg, limits)?;
            command = command.arg(tag, value);
        }
        Ok(command)
    }
}

impl<T: Transport> NanonisClient<T> {
    /// Invoke a catalog command by its friendly name.
    ///
    /// ```no_run
    /// use nanonis_control::NanonisClient;
    ///
    /// let client = NanonisClient::new("127.0.0.1", 6501)?;
    /// client.call("tip_xy_set", &["10n".into(), (-5e-9).into(), 1u32.into()])?;
    /// let xy = client.call("tip_xy_get", &[1u32.into()])?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn call(&self, name: &str, args: &[Arg]) -> Result<Vec<NanonisValue>, NanonisError> {
        let spec = lookup(name).ok_or_else(|| NanonisError::UnknownCommand(name.to_string()))?;
        let command = spec.resolve(args, &self.limits())?;
        debug!("{} -> {}", name, spec.command);
        self.execute(&command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_codes_are_valid() {
        for spec in CATALOG {
            let args = spec.arg_types().unwrap();
            let returns = spec.return_types().unwrap();
            assert_eq!(args.len(), spec.args.len(), "{}", spec.name);
            assert_eq!(returns.len(), spec.returns.len(), "{}", spec.name);
            assert!(spec.command.len() <= 32, "{}", spec.name);
            for (idx, tag) in returns.iter().enumerate() {
                if tag.is_counted() {
                    assert!(idx > 0 && returns[idx - 1].is_integer(), "{}", spec.name);
                }
            }
        }
    }

    #[test]
    fn test_catalog_names_unique() {
        let names: HashSet<_> = CATALOG.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), CATALOG.len());
    }

    #[test]
    fn test_resolve_engineering_literals() {
        let spec = lookup("tip_xy_set").unwrap();
        let command = spec
            .resolve(&["100n".into(), (-2e-7).into(), 1u32.into()], &Limits::default())
            .unwrap();
        assert_eq!(command.name, "FolMe.XYPosSet");
        assert_eq!(command.args[0].tag, TypeTag::F64);
        let x = command.args[0].value.as_f64().unwrap();
        assert!((x - 1e-7).abs() < 1e-20);
        assert_eq!(command.args[2].value, NanonisValue::U32(1));
    }

    #[test]
    fn test_resolve_casts_to_wire_width() {
        let spec = lookup("bias_set").unwrap();
        let command = spec.resolve(&["10m".into()], &Limits::default()).unwrap();
        assert_eq!(command.args[0].value, NanonisValue::F32(0.01));

        let spec = lookup("scan_action").unwrap();
        let command = spec
            .resolve(&[0u16.into(), "1".into()], &Limits::default())
            .unwrap();
        assert_eq!(command.args[0].value, NanonisValue::U16(0));
        assert_eq!(command.args[1].value, NanonisValue::U32(1));
    }

    #[test]
    fn test_resolve_rejects_bad_arguments() {
        let limits = Limits::default();
        let bias = lookup("bias_set").unwrap();
        assert!(matches!(
            bias.resolve(&["5x".into()], &limits),
            Err(NanonisError::InvalidValue(_))
        ));
        assert!(matches!(
            bias.resolve(&[], &limits),
            Err(NanonisError::InvalidCommand(_))
        ));

        let withdraw = lookup("z_ctrl_withdraw").unwrap();
        assert!(matches!(
            withdraw.resolve(&[1u32.into(), 1.5f64.into()], &limits),
            Err(NanonisError::InvalidValue(_))
        ));
        assert!(matches!(
            withdraw.resolve(&[(-1i32).into(), 100i32.into()], &limits),
            Err(NanonisError::InvalidValue(_))
        ));
        assert!(matches!(
            withdraw.resolve(&[NanonisValue::F32(1.0).into(), 100i32.into()], &limits),
            Err(NanonisError::Type(_))
        ));
    }

    #[test]
    fn test_limits_are_enforced() {
        let limits = Limits::default();
        let bias = lookup("bias_set").unwrap();
        assert!(bias.resolve(&[10.0f64.into()], &limits).is_ok());
        assert!(matches!(
            bias.resolve(&["10.5".into()], &limits),
            Err(NanonisError::InvalidValue(_))
        ));
        assert!(matches!(
            bias.resolve(&[NanonisValue::F32(-11.0).into()], &limits),
            Err(NanonisError::InvalidValue(_))
        ));

        let xy = lookup("tip_xy_set").unwrap();
        assert!(matches!(
            xy.resolve(&["2u".into(), 0.0f64.into(), 0u32.into()], &limits),
            Err(NanonisError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_atom_track_props_signature() {
        let spec = lookup("atom_track_props_get").unwrap();
        let command = spec.resolve(&[], &Limits::default()).unwrap();
        assert_eq!(command.name, "AtomTrack.PropsGet");
        assert!(command.args.is_empty());
        assert_eq!(command.return_types, vec![TypeTag::F32; 5]);
    }

    #[test]
    fn test_array_argument_passes_through() {
        let spec = lookup("signals_vals_get").unwrap();
        let command = spec
            .resolve(&[vec![0i32, 3].into(), true.into()], &Limits::default())
            .unwrap();
        assert_eq!(command.args[0].value, NanonisValue::from(vec![0i32, 3]));
        assert_eq!(
            command.return_types,
            vec![TypeTag::I32, TypeTag::counted(TypeTag::F32)]
        );
    }
}
