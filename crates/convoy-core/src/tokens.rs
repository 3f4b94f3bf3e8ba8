//! JSON argument coercion into ABI tokens
//!
//! Bundle definitions carry arguments as plain JSON; the target parameter
//! type from the contract ABI decides how each value is tokenized. Numbers
//! larger than 64 bits must be written as decimal or `0x` strings.

use crate::error::BuildError;
use ethers::abi::{ParamType, Token};
use ethers::types::{Address, Sign, I256, U256};
use serde_json::Value;

/// Coerce a JSON argument list against an ABI parameter list, one token per
/// parameter.
pub fn coerce_arguments(values: &[Value], kinds: &[ParamType]) -> Result<Vec<Token>, BuildError> {
    if values.len() != kinds.len() {
        return Err(BuildError::ArgumentCount {
            expected: kinds.len(),
            actual: values.len(),
        });
    }

    values
        .iter()
        .zip(kinds.iter())
        .enumerate()
        .map(|(position, (value, kind))| {
            coerce_token(value, kind)
                .map_err(|reason| BuildError::ArgumentMismatch { position, reason })
        })
        .collect()
}

fn coerce_token(value: &Value, kind: &ParamType) -> Result<Token, String> {
    match kind {
        ParamType::Address => {
            let raw = value
                .as_str()
                .ok_or_else(|| type_error("an address string", value))?;
            let address = raw
                .parse::<Address>()
                .map_err(|_| format!("{:?} is not a valid address", raw))?;
            Ok(Token::Address(address))
        }
        ParamType::Uint(_) => Ok(Token::Uint(coerce_uint(value)?)),
        ParamType::Int(_) => Ok(Token::Int(coerce_int(value)?)),
        ParamType::Bool => value
            .as_bool()
            .map(Token::Bool)
            .ok_or_else(|| type_error("a boolean", value)),
        ParamType::String => value
            .as_str()
            .map(|s| Token::String(s.to_string()))
            .ok_or_else(|| type_error("a string", value)),
        ParamType::Bytes => Ok(Token::Bytes(coerce_bytes(value)?)),
        ParamType::FixedBytes(size) => {
            let bytes = coerce_bytes(value)?;
            if bytes.len() != *size {
                return Err(format!("expected {} bytes, got {}", size, bytes.len()));
            }
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::Array(inner) => {
            let items = value
                .as_array()
                .ok_or_else(|| type_error("an array", value))?;
            let tokens = items
                .iter()
                .map(|item| coerce_token(item, inner))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Token::Array(tokens))
        }
        ParamType::FixedArray(inner, size) => {
            let items = value
                .as_array()
                .ok_or_else(|| type_error("an array", value))?;
            if items.len() != *size {
                return Err(format!(
                    "expected an array of {} elements, got {}",
                    size,
                    items.len()
                ));
            }
            let tokens = items
                .iter()
                .map(|item| coerce_token(item, inner))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Token::FixedArray(tokens))
        }
        ParamType::Tuple(members) => {
            let items = value
                .as_array()
                .ok_or_else(|| type_error("a tuple (JSON array)", value))?;
            if items.len() != members.len() {
                return Err(format!(
                    "expected a tuple of {} members, got {}",
                    members.len(),
                    items.len()
                ));
            }
            let tokens = items
                .iter()
                .zip(members.iter())
                .map(|(item, member)| coerce_token(item, member))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Token::Tuple(tokens))
        }
    }
}

fn coerce_uint(value: &Value) -> Result<U256, String> {
    match value {
        Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(|| {
            format!(
                "{} does not fit an unsigned 64-bit value, write it as a string",
                n
            )
        }),
        Value::String(s) => {
            if let Some(hexed) = s.strip_prefix("0x") {
                U256::from_str_radix(hexed, 16).map_err(|_| format!("{:?} is not valid hex", s))
            } else {
                U256::from_dec_str(s).map_err(|_| format!("{:?} is not a decimal number", s))
            }
        }
        other => Err(type_error("a number or numeric string", other)),
    }
}

fn coerce_int(value: &Value) -> Result<U256, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(|v| I256::from(v).into_raw())
            .ok_or_else(|| format!("{} does not fit a signed 64-bit value, write it as a string", n)),
        Value::String(s) => {
            let (sign, magnitude) = match s.strip_prefix('-') {
                Some(rest) => (Sign::Negative, rest),
                None => (Sign::Positive, s.as_str()),
            };
            if let Some(hexed) = magnitude.strip_prefix("0x") {
                let abs = U256::from_str_radix(hexed, 16)
                    .map_err(|_| format!("{:?} is not valid hex", s))?;
                I256::checked_from_sign_and_abs(sign, abs)
                    .map(|v| v.into_raw())
                    .ok_or_else(|| format!("{:?} does not fit a signed 256-bit value", s))
            } else {
                I256::from_dec_str(s)
                    .map(|v| v.into_raw())
                    .map_err(|_| format!("{:?} is not a decimal number", s))
            }
        }
        other => Err(type_error("a number or numeric string", other)),
    }
}

fn coerce_bytes(value: &Value) -> Result<Vec<u8>, String> {
    let raw = value
        .as_str()
        .ok_or_else(|| type_error("a hex string", value))?;
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(stripped).map_err(|e| format!("{:?} is not valid hex: {}", raw, e))
}

fn type_error(expected: &str, value: &Value) -> String {
    let got = match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{:?}", s),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    };
    format!("expected {}, got {}", expected, got)
}
