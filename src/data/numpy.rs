// Copyright (C) 2024 Bellande Artificial Intelligence Computer Vision Research Innovation Center, Ronaldson Bellande

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::core::error::BellandeError;
use crate::data::pickle::PickleValue;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumpyDtype {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
}

impl NumpyDtype {
    /// Parses a type string such as `u1`, `<i8` or `|b1`.
    pub fn parse(descr: &str) -> Option<(Self, Option<bool>)> {
        let (little_endian, code) = match descr.chars().next()? {
            '<' => (Some(true), &descr[1..]),
            '>' => (Some(false), &descr[1..]),
            '|' | '=' => (None, &descr[1..]),
            _ => (None, descr),
        };

        let dtype = match code {
            "b1" | "?" => NumpyDtype::Bool,
            "u1" | "B" => NumpyDtype::U8,
            "i1" | "b" => NumpyDtype::I8,
            "u2" => NumpyDtype::U16,
            "i2" => NumpyDtype::I16,
            "u4" => NumpyDtype::U32,
            "i4" => NumpyDtype::I32,
            "u8" => NumpyDtype::U64,
            "i8" => NumpyDtype::I64,
            _ => return None,
        };
        Some((dtype, little_endian))
    }

    pub fn item_size(&self) -> usize {
        match self {
            NumpyDtype::Bool | NumpyDtype::U8 | NumpyDtype::I8 => 1,
            NumpyDtype::U16 | NumpyDtype::I16 => 2,
            NumpyDtype::U32 | NumpyDtype::I32 => 4,
            NumpyDtype::U64 | NumpyDtype::I64 => 8,
        }
    }
}

/// A numpy array recovered from a pickled ndarray.
///
/// Protocols up to 4 pickle arrays as `numpy.core.multiarray._reconstruct` with the
/// payload in the `BUILD` state; protocol 5 uses `numpy.core.numeric._frombuffer`.
#[derive(Debug, Clone)]
pub struct NumpyArray {
    pub shape: Vec<usize>,
    pub dtype: NumpyDtype,
    pub little_endian: bool,
    pub fortran_order: bool,
    data: Arc<Vec<u8>>,
}

impl NumpyArray {
    /// True when `value` is one of the pickled ndarray forms.
    pub fn is_array(value: &PickleValue) -> bool {
        match value {
            PickleValue::Object { class, .. } => {
                class.is_global("multiarray", "_reconstruct") || class.is_global("numeric", "_frombuffer")
            }
            _ => false,
        }
    }

    pub fn from_pickle(value: PickleValue) -> Result<Self, BellandeError> {
        let PickleValue::Object { class, args, state } = value else {
            return Err(invalid(format!("expected ndarray, found {}", value.type_name())));
        };
        if class.is_global("multiarray", "_reconstruct") {
            let state = match state.map(|s| *s) {
                Some(PickleValue::Tuple(items)) => items,
                _ => return Err(invalid("ndarray state is missing")),
            };
            Self::from_reconstruct(state)
        } else if class.is_global("numeric", "_frombuffer") {
            match *args {
                PickleValue::Tuple(items) => Self::from_frombuffer(items),
                _ => Err(invalid("_frombuffer arguments are not a tuple")),
            }
        } else {
            Err(invalid("object is not a numpy ndarray"))
        }
    }

    fn from_reconstruct(state: Vec<PickleValue>) -> Result<Self, BellandeError> {
        // (version, shape, dtype, is_fortran, data); version is absent in old pickles
        let mut fields = state.into_iter();
        if fields.len() == 5 {
            fields.next();
        }
        let (Some(shape), Some(dtype), Some(fortran), Some(data), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(invalid("unexpected ndarray state layout"));
        };

        let fortran_order = fortran
            .as_int()
            .map(|flag| flag != 0)
            .ok_or_else(|| invalid("ndarray order flag is not a bool"))?;
        Self::assemble(parse_shape(&shape)?, parse_dtype(&dtype)?, fortran_order, byte_payload(data)?)
    }

    /// `_frombuffer(buffer, dtype, shape, order)`
    fn from_frombuffer(args: Vec<PickleValue>) -> Result<Self, BellandeError> {
        let mut fields = args.into_iter();
        let (Some(buffer), Some(dtype), Some(shape), Some(order), None) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            return Err(invalid("unexpected _frombuffer argument layout"));
        };

        let fortran_order = match order.as_text().as_deref() {
            Some("C") => false,
            Some("F") => true,
            other => return Err(invalid(format!("unsupported ndarray order {:?}", other))),
        };
        Self::assemble(parse_shape(&shape)?, parse_dtype(&dtype)?, fortran_order, byte_payload(buffer)?)
    }

    fn assemble(
        shape: Vec<usize>,
        (dtype, little_endian): (NumpyDtype, bool),
        fortran_order: bool,
        data: Arc<Vec<u8>>,
    ) -> Result<Self, BellandeError> {
        let expected = shape.iter().product::<usize>() * dtype.item_size();
        if data.len() != expected {
            return Err(invalid(format!(
                "ndarray payload has {} bytes, shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }

        Ok(NumpyArray {
            shape,
            dtype,
            little_endian,
            fortran_order,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes of a one-byte dtype in C order.
    pub fn into_bytes(self) -> Result<Vec<u8>, BellandeError> {
        if self.dtype.item_size() != 1 {
            return Err(invalid(format!(
                "expected a byte array, found {:?}",
                self.dtype
            )));
        }

        let shape = self.shape;
        let fortran_order = self.fortran_order;
        let bytes = Arc::try_unwrap(self.data).unwrap_or_else(|shared| (*shared).clone());
        c_order(bytes, &shape, fortran_order)
    }

    /// Elements of an integer or bool array widened to `i64`, in C order.
    pub fn to_i64(&self) -> Result<Vec<i64>, BellandeError> {
        let size = self.dtype.item_size();
        let le = self.little_endian;
        let values: Vec<i64> = self
            .data
            .chunks_exact(size)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                if le {
                    buf[..size].copy_from_slice(chunk);
                } else {
                    for (dst, src) in buf[..size].iter_mut().zip(chunk.iter().rev()) {
                        *dst = *src;
                    }
                }
                let raw = u64::from_le_bytes(buf);
                match self.dtype {
                    NumpyDtype::I8 => raw as u8 as i8 as i64,
                    NumpyDtype::I16 => raw as u16 as i16 as i64,
                    NumpyDtype::I32 => raw as u32 as i32 as i64,
                    _ => raw as i64,
                }
            })
            .collect();

        c_order(values, &self.shape, self.fortran_order)
    }
}

/// Raw bytes of a pickled byte string.
///
/// Python 3 writes `bytes` below protocol 3 as `_codecs.encode(text, 'latin1')`.
pub fn byte_payload(value: PickleValue) -> Result<Arc<Vec<u8>>, BellandeError> {
    match value {
        PickleValue::Bytes(bytes) => Ok(bytes),
        PickleValue::String(text) => Ok(Arc::new(latin1_bytes(&text))),
        PickleValue::Object { class, args, .. } if class.is_global("_codecs", "encode") => {
            let items = args.as_sequence().unwrap_or_default();
            let text = items
                .first()
                .and_then(|text| text.as_text())
                .ok_or_else(|| invalid("_codecs.encode has no text argument"))?;
            if let Some(encoding) = items.get(1).and_then(|e| e.as_text()) {
                if !matches!(encoding.to_ascii_lowercase().as_str(), "latin1" | "latin-1" | "iso-8859-1") {
                    return Err(invalid(format!("unsupported byte string encoding {:?}", encoding)));
                }
            }
            Ok(Arc::new(latin1_bytes(&text)))
        }
        other => Err(invalid(format!(
            "payload of type {} is not a byte string",
            other.type_name()
        ))),
    }
}

fn latin1_bytes(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u32 as u8).collect()
}

fn parse_shape(value: &PickleValue) -> Result<Vec<usize>, BellandeError> {
    value
        .as_sequence()
        .ok_or_else(|| invalid("ndarray shape is not a tuple"))?
        .iter()
        .map(|dim| {
            dim.as_int()
                .and_then(|d| usize::try_from(d).ok())
                .ok_or_else(|| invalid("ndarray dimension is not a size"))
        })
        .collect()
}

fn parse_dtype(value: &PickleValue) -> Result<(NumpyDtype, bool), BellandeError> {
    let PickleValue::Object { class, args, state } = value else {
        return Err(invalid("ndarray dtype is not a numpy.dtype"));
    };
    if !class.is_global("numpy", "dtype") {
        return Err(invalid("ndarray dtype is not a numpy.dtype"));
    }

    let descr = args
        .as_sequence()
        .and_then(|items| items.first())
        .and_then(|d| d.as_text())
        .ok_or_else(|| invalid("numpy.dtype has no type string"))?;
    let (dtype, explicit_order) = NumpyDtype::parse(&descr)
        .ok_or_else(|| invalid(format!("unsupported dtype {:?}", descr)))?;

    // state = (version, byteorder, ...)
    let state_order = state
        .as_deref()
        .and_then(|s| s.as_sequence())
        .and_then(|items| items.get(1))
        .and_then(|order| order.as_text())
        .and_then(|order| match order.as_ref() {
            "<" => Some(true),
            ">" => Some(false),
            _ => None,
        });

    let little_endian = state_order
        .or(explicit_order)
        .unwrap_or(cfg!(target_endian = "little"));
    Ok((dtype, little_endian))
}

fn c_order<T: Clone>(values: Vec<T>, shape: &[usize], fortran_order: bool) -> Result<Vec<T>, BellandeError> {
    if !fortran_order || shape.len() < 2 {
        return Ok(values);
    }
    let array = ArrayD::from_shape_vec(IxDyn(shape).f(), values)?;
    Ok(array.as_standard_layout().into_owned().into_raw_vec())
}

fn invalid<S: Into<String>>(reason: S) -> BellandeError {
    BellandeError::SerializationError(reason.into())
}
