use super::codec::{self, ByteReader};
use crate::error::NanonisError;
use crate::types::{NanonisValue, TypeTag, TypedValue};
use log::debug;

// Protocol constants
pub const COMMAND_SIZE: usize = 32;
pub const HEADER_SIZE: usize = 40;
pub const ERROR_INFO_SIZE: usize = 8;
pub const MAX_RESPONSE_SIZE: usize = 100 * 1024 * 1024; // 100MB
pub const RESPONSE_FLAG: u16 = 1;
pub const ZERO_BUFFER: u16 = 0;

/// Fixed 40 byte header shared by requests and responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub command: String,
    pub body_size: u32,
    pub send_response: bool,
}

impl MessageHeader {
    pub fn new(command: &str, body_size: u32) -> Self {
        Self {
            command: command.to_string(),
            body_size,
            send_response: true, // Always request response for error info
        }
    }

    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE], NanonisError> {
        let name = self.command.as_bytes();
        if name.is_empty() || name.len() > COMMAND_SIZE {
            return Err(NanonisError::InvalidCommand(format!(
                "Command name '{}' must be 1 to {} bytes",
                self.command, COMMAND_SIZE
            )));
        }

        let flag = if self.send_response {
            RESPONSE_FLAG
        } else {
            ZERO_BUFFER
        };

        let mut buf = [0u8; HEADER_SIZE];
        buf[..name.len()].copy_from_slice(name);
        buf[32..36].copy_from_slice(&self.body_size.to_be_bytes());
        buf[36..38].copy_from_slice(&flag.to_be_bytes());
        buf[38..40].copy_from_slice(&ZERO_BUFFER.to_be_bytes());
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NanonisError> {
        let mut reader = ByteReader::new(bytes);
        let name = reader.take(COMMAND_SIZE)?;
        let body_size = reader.read_u32()?;
        let flag = reader.read_u16()?;
        let _padding = reader.read_u16()?;

        let end = name.iter().position(|&b| b == 0).unwrap_or(COMMAND_SIZE);
        Ok(Self {
            command: String::from_utf8_lossy(&name[..end]).into_owned(),
            body_size,
            send_response: flag == RESPONSE_FLAG,
        })
    }
}

/// One remote procedure invocation: name, typed arguments and the
/// types expected back.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub args: Vec<TypedValue>,
    pub return_types: Vec<TypeTag>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            return_types: Vec::new(),
        }
    }

    pub fn arg(mut self, tag: TypeTag, value: impl Into<NanonisValue>) -> Self {
        self.args.push(TypedValue::new(tag, value));
        self
    }

    pub fn returns(mut self, tags: impl IntoIterator<Item = TypeTag>) -> Self {
        self.return_types.extend(tags);
        self
    }

    /// Pair parallel type and value lists into a command.
    pub fn from_parts(
        name: &str,
        arg_types: &[TypeTag],
        args: &[NanonisValue],
        return_types: &[TypeTag],
    ) -> Result<Self, NanonisError> {
        if arg_types.len() != args.len() {
            return Err(NanonisError::Type(format!(
                "{}: {} argument types for {} values",
                name,
                arg_types.len(),
                args.len()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            args: arg_types
                .iter()
                .zip(args)
                .map(|(tag, value)| TypedValue::new(tag.clone(), value.clone()))
                .collect(),
            return_types: return_types.to_vec(),
        })
    }
}

/// Server-side failure reported in the error section of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFault {
    pub code: u32,
    pub message: String,
}

impl From<ServerFault> for NanonisError {
    fn from(fault: ServerFault) -> Self {
        NanonisError::ServerError {
            code: fault.code,
            message: fault.message,
        }
    }
}

/// Decoded response. `values` is empty whenever `error` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub command: String,
    pub values: Vec<NanonisValue>,
    pub error: Option<ServerFault>,
}

impl Response {
    pub fn into_result(self) -> Result<Vec<NanonisValue>, NanonisError> {
        match self.error {
            Some(fault) => Err(fault.into()),
            None => Ok(self.values),
        }
    }
}

/// Low-level protocol handling
pub struct Protocol;

impl Protocol {
    /// Check that argument values fit their declared types and that every
    /// count-from-previous argument follows a matching integer.
    pub fn validate_args(args: &[TypedValue]) -> Result<(), NanonisError> {
        for (idx, arg) in args.iter().enumerate() {
            if let TypeTag::Array(inner) = &arg.tag {
                if inner.is_counted() {
                    return Err(NanonisError::Type(format!(
                        "Argument {}: count-from-previous type inside prefixed array {}",
                        idx, arg.tag
                    )));
                }
            }

            if !arg.value.matches(&arg.tag) {
                return Err(NanonisError::Type(format!(
                    "Argument {}: {:?} does not match type {}",
                    idx, arg.value, arg.tag
                )));
            }

            if arg.tag.is_counted() {
                let count = idx
                    .checked_sub(1)
                    .and_then(|prev| args[prev].value.as_count())
                    .ok_or_else(|| {
                        NanonisError::Type(format!(
                            "Argument {} of type {} must follow an integer count",
                            idx, arg.tag
                        ))
                    })?;
                let actual = match &arg.value {
                    NanonisValue::String(s) => s.len(),
                    NanonisValue::Array(items) => items.len(),
                    _ => 0,
                };
                if count != actual {
                    return Err(NanonisError::Type(format!(
                        "Argument {idx}: count {count} does not match length {actual}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serialize the argument sequence into a request body.
    pub fn encode_body(args: &[TypedValue]) -> Result<Vec<u8>, NanonisError> {
        Self::validate_args(args)?;
        let mut body = Vec::new();
        for arg in args {
            codec::encode_into(&arg.tag, &arg.value, &mut body)?;
        }
        Ok(body)
    }

    /// Build the complete request frame. The header's body size is taken
    /// from the encoded body.
    pub fn build_request(command: &Command) -> Result<Vec<u8>, NanonisError> {
        let body = Self::encode_body(&command.args)?;
        let body_size = u32::try_from(body.len()).map_err(|_| {
            NanonisError::InvalidCommand(format!("{}: body too large", command.name))
        })?;
        let header = MessageHeader::new(&command.name, body_size).to_bytes()?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode values strictly in the order of `types`.
    pub fn parse_values(
        reader: &mut ByteReader<'_>,
        types: &[TypeTag],
    ) -> Result<Vec<NanonisValue>, NanonisError> {
        let mut result: Vec<NanonisValue> = Vec::with_capacity(types.len());

        for tag in types {
            let value = if tag.is_counted() {
                let count = result.last().and_then(NanonisValue::as_count).ok_or_else(|| {
                    NanonisError::Protocol(format!(
                        "Count for type {tag} not found in preceding value"
                    ))
                })?;
                codec::decode_counted(tag, count, reader)?
            } else {
                codec::decode_from(tag, reader)?
            };
            result.push(value);
        }

        Ok(result)
    }

    /// Read the error section: status, description size, description.
    fn parse_error_info(reader: &mut ByteReader<'_>) -> Result<Option<ServerFault>, NanonisError> {
        if reader.remaining() < ERROR_INFO_SIZE {
            return Err(NanonisError::Protocol(format!(
                "Error section missing: {} bytes left, {} needed",
                reader.remaining(),
                ERROR_INFO_SIZE
            )));
        }

        let code = reader.read_u32()?;
        let size = reader.read_i32()?;
        let size = usize::try_from(size)
            .map_err(|_| NanonisError::Protocol(format!("Negative error size {size}")))?;
        let message_bytes = reader.take(size)?;
        let message = String::from_utf8_lossy(message_bytes).into_owned();

        if code != 0 || !message.trim().is_empty() {
            Ok(Some(ServerFault { code, message }))
        } else {
            Ok(None)
        }
    }

    /// Parse a response body: return values followed by the error section.
    ///
    /// A populated error section always wins over the values. Bytes after
    /// the error section are ignored.
    pub fn parse_body(
        command: &str,
        body: &[u8],
        return_types: &[TypeTag],
    ) -> Result<Response, NanonisError> {
        let mut reader = ByteReader::new(body);
        let decoded = Self::parse_values(&mut reader, return_types)
            .and_then(|values| Ok((values, Self::parse_error_info(&mut reader)?)));

        match decoded {
            Ok((_, Some(fault))) => Ok(Response {
                command: command.to_string(),
                values: Vec::new(),
                error: Some(fault),
            }),
            Ok((values, None)) => Ok(Response {
                command: command.to_string(),
                values,
                error: None,
            }),
            Err(decode_err) => {
                // Some servers send only the error section on failure
                let mut reader = ByteReader::new(body);
                match Self::parse_error_info(&mut reader) {
                    Ok(Some(fault)) if reader.remaining() == 0 => {
                        debug!("{command}: body holds only an error section");
                        Ok(Response {
                            command: command.to_string(),
                            values: Vec::new(),
                            error: Some(fault),
                        })
                    }
                    _ => Err(decode_err),
                }
            }
        }
    }

    /// Parse a complete response frame (header and body).
    pub fn parse_response(frame: &[u8], return_types: &[TypeTag]) -> Result<Response, NanonisError> {
        let header = MessageHeader::from_bytes(frame)?;
        let body_size = Self::check_body_size(header.body_size)?;
        let body = frame
            .get(HEADER_SIZE..HEADER_SIZE + body_size)
            .ok_or_else(|| {
                NanonisError::Protocol(format!(
                    "Frame declares {} body bytes, only {} present",
                    body_size,
                    frame.len().saturating_sub(HEADER_SIZE)
                ))
            })?;
        Self::parse_body(&header.command, body, return_types)
    }

    pub fn check_body_size(body_size: u32) -> Result<usize, NanonisError> {
        let size = body_size as usize;
        if size > MAX_RESPONSE_SIZE {
            return Err(NanonisError::Protocol(format!(
                "Response size {} exceeds maximum {}",
                size, MAX_RESPONSE_SIZE
            )));
        }
        Ok(size)
    }

    /// Validate command response header, returning the body size
    pub fn validate_response_header(
        header: &[u8; HEADER_SIZE],
        expected_command: &str,
    ) -> Result<usize, NanonisError> {
        let header = MessageHeader::from_bytes(header)?;
        if header.command != expected_command {
            return Err(NanonisError::CommandMismatch {
                expected: expected_command.to_string(),
                actual: header.command,
            });
        }
        Self::check_body_size(header.body_size)
    }
}
