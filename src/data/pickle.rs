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

//! Decoder for Python pickle streams (protocols 0 to 5, in-band data only).
//!
//! The decoder runs the pickle opcode machine far enough to rebuild plain
//! containers and scalars. Class instances are not constructed: a `REDUCE` or
//! `NEWOBJ` yields a [`PickleValue::Object`] carrying the callable, its
//! arguments and any state applied by `BUILD`, which is all the numpy array
//! reconstruction in [`crate::data::numpy`] needs.
//!
//! Memoized values are stored by value. A container that is memoized and then
//! mutated is fetched back in the state it had when it was memoized.

use crate::core::error::BellandeError;
use crate::utilities::byte::{BigEndian, LittleEndian, ReadBytes};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

const HIGHEST_PROTOCOL: u8 = 5;

// Protocol 0 and 1
const MARK: u8 = b'(';
const STOP: u8 = b'.';
const POP: u8 = b'0';
const POP_MARK: u8 = b'1';
const DUP: u8 = b'2';
const FLOAT: u8 = b'F';
const INT: u8 = b'I';
const BININT: u8 = b'J';
const BININT1: u8 = b'K';
const LONG: u8 = b'L';
const BININT2: u8 = b'M';
const NONE: u8 = b'N';
const REDUCE: u8 = b'R';
const STRING: u8 = b'S';
const BINSTRING: u8 = b'T';
const SHORT_BINSTRING: u8 = b'U';
const UNICODE: u8 = b'V';
const BINUNICODE: u8 = b'X';
const APPEND: u8 = b'a';
const BUILD: u8 = b'b';
const GLOBAL: u8 = b'c';
const DICT: u8 = b'd';
const EMPTY_DICT: u8 = b'}';
const APPENDS: u8 = b'e';
const GET: u8 = b'g';
const BINGET: u8 = b'h';
const LONG_BINGET: u8 = b'j';
const LIST: u8 = b'l';
const EMPTY_LIST: u8 = b']';
const PUT: u8 = b'p';
const BINPUT: u8 = b'q';
const LONG_BINPUT: u8 = b'r';
const SETITEM: u8 = b's';
const TUPLE: u8 = b't';
const EMPTY_TUPLE: u8 = b')';
const SETITEMS: u8 = b'u';
const BINFLOAT: u8 = b'G';

// Protocol 2
const PROTO: u8 = 0x80;
const NEWOBJ: u8 = 0x81;
const TUPLE1: u8 = 0x85;
const TUPLE2: u8 = 0x86;
const TUPLE3: u8 = 0x87;
const NEWTRUE: u8 = 0x88;
const NEWFALSE: u8 = 0x89;
const LONG1: u8 = 0x8a;
const LONG4: u8 = 0x8b;

// Protocol 3
const BINBYTES: u8 = b'B';
const SHORT_BINBYTES: u8 = b'C';

// Protocol 4
const SHORT_BINUNICODE: u8 = 0x8c;
const BINUNICODE8: u8 = 0x8d;
const BINBYTES8: u8 = 0x8e;
const EMPTY_SET: u8 = 0x8f;
const ADDITEMS: u8 = 0x90;
const FROZENSET: u8 = 0x91;
const NEWOBJ_EX: u8 = 0x92;
const STACK_GLOBAL: u8 = 0x93;
const MEMOIZE: u8 = 0x94;
const FRAME: u8 = 0x95;

// Protocol 5
const BYTEARRAY8: u8 = 0x96;

/// How Python 2 `str` payloads (`STRING`, `BINSTRING`, `SHORT_BINSTRING`) are treated.
///
/// Both modes keep the raw bytes. `Latin1` accepts any byte and reads text
/// through latin-1, the way the CIFAR batches have to be opened from Python 3.
/// `Ascii` rejects non-ASCII payloads, like Python's default decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringDecoding {
    #[default]
    Latin1,
    Ascii,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickleValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Python 3 `bytes` or a Python 2 `str`.
    Bytes(Arc<Vec<u8>>),
    String(String),
    List(Vec<PickleValue>),
    Tuple(Vec<PickleValue>),
    Set(Vec<PickleValue>),
    /// Insertion-ordered mapping.
    Dict(Vec<(PickleValue, PickleValue)>),
    Global {
        module: String,
        name: String,
    },
    Object {
        class: Box<PickleValue>,
        args: Box<PickleValue>,
        state: Option<Box<PickleValue>>,
    },
}

impl PickleValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PickleValue::None => "None",
            PickleValue::Bool(_) => "bool",
            PickleValue::Int(_) => "int",
            PickleValue::Float(_) => "float",
            PickleValue::Bytes(_) => "bytes",
            PickleValue::String(_) => "str",
            PickleValue::List(_) => "list",
            PickleValue::Tuple(_) => "tuple",
            PickleValue::Set(_) => "set",
            PickleValue::Dict(_) => "dict",
            PickleValue::Global { .. } => "global",
            PickleValue::Object { .. } => "object",
        }
    }

    /// Text view of a string value; byte strings are read as latin-1.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            PickleValue::String(s) => Some(Cow::Borrowed(s.as_str())),
            PickleValue::Bytes(bytes) => Some(Cow::Owned(latin1(bytes))),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PickleValue::Bytes(bytes) => Some(bytes.as_slice()),
            PickleValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            PickleValue::Int(v) => Some(v),
            PickleValue::Bool(b) => Some(b as i64),
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    pub fn as_sequence(&self) -> Option<&[PickleValue]> {
        match self {
            PickleValue::List(items) | PickleValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a dict entry by its text key.
    pub fn get(&self, key: &str) -> Option<&PickleValue> {
        match self {
            PickleValue::Dict(entries) => entries
                .iter()
                .find(|(k, _)| k.as_text().is_some_and(|text| text == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Takes a dict entry out by its text key.
    pub fn remove(&mut self, key: &str) -> Option<PickleValue> {
        match self {
            PickleValue::Dict(entries) => {
                let position = entries
                    .iter()
                    .position(|(k, _)| k.as_text().is_some_and(|text| text == key))?;
                Some(entries.remove(position).1)
            }
            _ => None,
        }
    }

    /// True for a global whose module ends with `module_suffix` and whose name is `name`.
    pub fn is_global(&self, module_suffix: &str, name: &str) -> bool {
        matches!(self, PickleValue::Global { module, name: n }
            if n == name && module.ends_with(module_suffix))
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Decodes a complete pickle stream.
pub fn from_reader<R: Read>(reader: R, decoding: StringDecoding) -> Result<PickleValue, BellandeError> {
    Unpickler::new(reader, decoding).load()
}

pub fn from_slice(bytes: &[u8], decoding: StringDecoding) -> Result<PickleValue, BellandeError> {
    from_reader(bytes, decoding)
}

pub fn from_path<P: AsRef<Path>>(path: P, decoding: StringDecoding) -> Result<PickleValue, BellandeError> {
    let file = File::open(path)?;
    from_reader(BufReader::new(file), decoding)
}

struct CountingReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

struct Unpickler<R> {
    reader: CountingReader<R>,
    decoding: StringDecoding,
    stack: Vec<PickleValue>,
    metastack: Vec<Vec<PickleValue>>,
    memo: HashMap<u32, PickleValue>,
}

impl<R: Read> Unpickler<R> {
    fn new(reader: R, decoding: StringDecoding) -> Self {
        Unpickler {
            reader: CountingReader { inner: reader, offset: 0 },
            decoding,
            stack: Vec::new(),
            metastack: Vec::new(),
            memo: HashMap::new(),
        }
    }

    fn error<S: Into<String>>(&self, reason: S) -> BellandeError {
        BellandeError::Pickle {
            offset: self.reader.offset,
            reason: reason.into(),
        }
    }

    fn io<T>(&self, result: io::Result<T>) -> Result<T, BellandeError> {
        result.map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => self.error("unexpected end of pickle stream"),
            _ => self.error(e.to_string()),
        })
    }

    fn read_byte(&mut self) -> Result<u8, BellandeError> {
        let result = self.reader.read_u8();
        self.io(result)
    }

    fn read_u16_le(&mut self) -> Result<u16, BellandeError> {
        let result = self.reader.read_u16::<LittleEndian>();
        self.io(result)
    }

    fn read_i32_le(&mut self) -> Result<i32, BellandeError> {
        let result = self.reader.read_i32::<LittleEndian>();
        self.io(result)
    }

    fn read_u32_le(&mut self) -> Result<u32, BellandeError> {
        let result = self.reader.read_u32::<LittleEndian>();
        self.io(result)
    }

    fn read_u64_le(&mut self) -> Result<u64, BellandeError> {
        let result = self.reader.read_u64::<LittleEndian>();
        self.io(result)
    }

    fn read_f64_be(&mut self) -> Result<f64, BellandeError> {
        let result = self.reader.read_f64::<BigEndian>();
        self.io(result)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, BellandeError> {
        let result = self.reader.read_vec(len);
        self.io(result)
    }

    fn read_raw_line(&mut self) -> Result<Vec<u8>, BellandeError> {
        let result = self.reader.read_line_bytes();
        self.io(result)
    }

    fn load(mut self) -> Result<PickleValue, BellandeError> {
        loop {
            let op = self.read_byte()?;
            match op {
                PROTO => {
                    let version = self.read_byte()?;
                    if version > HIGHEST_PROTOCOL {
                        return Err(self.error(format!("unsupported protocol {}", version)));
                    }
                }
                FRAME => {
                    self.read_u64_le()?;
                }
                STOP => return self.pop(),

                MARK => {
                    let stack = std::mem::take(&mut self.stack);
                    self.metastack.push(stack);
                }
                POP => {
                    if self.stack.is_empty() {
                        self.pop_mark()?;
                    } else {
                        self.pop()?;
                    }
                }
                POP_MARK => {
                    self.pop_mark()?;
                }
                DUP => {
                    let top = self.top()?.clone();
                    self.stack.push(top);
                }

                NONE => self.stack.push(PickleValue::None),
                NEWTRUE => self.stack.push(PickleValue::Bool(true)),
                NEWFALSE => self.stack.push(PickleValue::Bool(false)),

                INT => {
                    let line = self.read_line()?;
                    let value = match line.as_str() {
                        "00" => PickleValue::Bool(false),
                        "01" => PickleValue::Bool(true),
                        text => PickleValue::Int(self.parse_int(text)?),
                    };
                    self.stack.push(value);
                }
                LONG => {
                    let line = self.read_line()?;
                    let value = self.parse_int(line.trim_end_matches('L'))?;
                    self.stack.push(PickleValue::Int(value));
                }
                BININT => {
                    let value = self.read_i32_le()?;
                    self.stack.push(PickleValue::Int(value as i64));
                }
                BININT1 => {
                    let value = self.read_byte()?;
                    self.stack.push(PickleValue::Int(value as i64));
                }
                BININT2 => {
                    let value = self.read_u16_le()?;
                    self.stack.push(PickleValue::Int(value as i64));
                }
                LONG1 => {
                    let len = self.read_byte()? as usize;
                    let bytes = self.read_bytes(len)?;
                    let value = self.decode_long(&bytes)?;
                    self.stack.push(PickleValue::Int(value));
                }
                LONG4 => {
                    let len = self.read_i32_le()?;
                    let len = self.length(len as i64)?;
                    let bytes = self.read_bytes(len)?;
                    let value = self.decode_long(&bytes)?;
                    self.stack.push(PickleValue::Int(value));
                }
                FLOAT => {
                    let line = self.read_line()?;
                    let value = line
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| self.error(format!("invalid float literal {:?}", line)))?;
                    self.stack.push(PickleValue::Float(value));
                }
                BINFLOAT => {
                    let value = self.read_f64_be()?;
                    self.stack.push(PickleValue::Float(value));
                }

                STRING => {
                    let line = self.read_raw_line()?;
                    let bytes = self.unquote(&line)?;
                    let value = self.py2_string(bytes)?;
                    self.stack.push(value);
                }
                BINSTRING => {
                    let len = self.read_i32_le()?;
                    let len = self.length(len as i64)?;
                    let bytes = self.read_bytes(len)?;
                    let value = self.py2_string(bytes)?;
                    self.stack.push(value);
                }
                SHORT_BINSTRING => {
                    let len = self.read_byte()? as usize;
                    let bytes = self.read_bytes(len)?;
                    let value = self.py2_string(bytes)?;
                    self.stack.push(value);
                }

                BINBYTES => {
                    let len = self.read_u32_le()? as usize;
                    let bytes = self.read_bytes(len)?;
                    self.stack.push(PickleValue::Bytes(Arc::new(bytes)));
                }
                SHORT_BINBYTES => {
                    let len = self.read_byte()? as usize;
                    let bytes = self.read_bytes(len)?;
                    self.stack.push(PickleValue::Bytes(Arc::new(bytes)));
                }
                BINBYTES8 | BYTEARRAY8 => {
                    let len = self.read_u64_le()?;
                    let len = self.length(len as i64)?;
                    let bytes = self.read_bytes(len)?;
                    self.stack.push(PickleValue::Bytes(Arc::new(bytes)));
                }

                UNICODE => {
                    let line = self.read_raw_line()?;
                    let text = self.raw_unicode_escape(&line)?;
                    self.stack.push(PickleValue::String(text));
                }
                BINUNICODE => {
                    let len = self.read_u32_le()? as usize;
                    let value = self.utf8(len)?;
                    self.stack.push(value);
                }
                SHORT_BINUNICODE => {
                    let len = self.read_byte()? as usize;
                    let value = self.utf8(len)?;
                    self.stack.push(value);
                }
                BINUNICODE8 => {
                    let len = self.read_u64_le()?;
                    let len = self.length(len as i64)?;
                    let value = self.utf8(len)?;
                    self.stack.push(value);
                }

                EMPTY_LIST => self.stack.push(PickleValue::List(Vec::new())),
                EMPTY_TUPLE => self.stack.push(PickleValue::Tuple(Vec::new())),
                EMPTY_DICT => self.stack.push(PickleValue::Dict(Vec::new())),
                EMPTY_SET => self.stack.push(PickleValue::Set(Vec::new())),
                LIST => {
                    let items = self.pop_mark()?;
                    self.stack.push(PickleValue::List(items));
                }
                TUPLE => {
                    let items = self.pop_mark()?;
                    self.stack.push(PickleValue::Tuple(items));
                }
                FROZENSET => {
                    let items = self.pop_mark()?;
                    self.stack.push(PickleValue::Set(items));
                }
                DICT => {
                    let items = self.pop_mark()?;
                    let mut dict = PickleValue::Dict(Vec::new());
                    self.set_items(&mut dict, items)?;
                    self.stack.push(dict);
                }
                TUPLE1 | TUPLE2 | TUPLE3 => {
                    let n = (op - TUPLE1 + 1) as usize;
                    if self.stack.len() < n {
                        return Err(self.error("stack underflow building tuple"));
                    }
                    let items = self.stack.split_off(self.stack.len() - n);
                    self.stack.push(PickleValue::Tuple(items));
                }

                APPEND => {
                    let item = self.pop()?;
                    self.append(vec![item])?;
                }
                APPENDS => {
                    let items = self.pop_mark()?;
                    self.append(items)?;
                }
                SETITEM => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    let mut target = self.pop()?;
                    self.set_items(&mut target, vec![key, value])?;
                    self.stack.push(target);
                }
                SETITEMS => {
                    let items = self.pop_mark()?;
                    let mut target = self.pop()?;
                    self.set_items(&mut target, items)?;
                    self.stack.push(target);
                }
                ADDITEMS => {
                    let items = self.pop_mark()?;
                    match self.stack.last_mut() {
                        Some(PickleValue::Set(set)) => set.extend(items),
                        _ => return Err(self.error("ADDITEMS target is not a set")),
                    }
                }

                GET => {
                    let line = self.read_line()?;
                    let index = self.parse_int(&line)?;
                    self.memo_get(index as u32)?;
                }
                BINGET => {
                    let index = self.read_byte()?;
                    self.memo_get(index as u32)?;
                }
                LONG_BINGET => {
                    let index = self.read_u32_le()?;
                    self.memo_get(index)?;
                }
                PUT => {
                    let line = self.read_line()?;
                    let index = self.parse_int(&line)?;
                    self.memo_put(index as u32)?;
                }
                BINPUT => {
                    let index = self.read_byte()?;
                    self.memo_put(index as u32)?;
                }
                LONG_BINPUT => {
                    let index = self.read_u32_le()?;
                    self.memo_put(index)?;
                }
                MEMOIZE => {
                    let index = self.memo.len() as u32;
                    self.memo_put(index)?;
                }

                GLOBAL => {
                    let module = self.read_line()?;
                    let name = self.read_line()?;
                    self.stack.push(PickleValue::Global { module, name });
                }
                STACK_GLOBAL => {
                    let name = self.pop()?;
                    let module = self.pop()?;
                    match (module.as_text(), name.as_text()) {
                        (Some(module), Some(name)) => self.stack.push(PickleValue::Global {
                            module: module.into_owned(),
                            name: name.into_owned(),
                        }),
                        _ => return Err(self.error("STACK_GLOBAL expects two strings")),
                    }
                }
                REDUCE | NEWOBJ => {
                    let args = self.pop()?;
                    let class = self.pop()?;
                    self.stack.push(PickleValue::Object {
                        class: Box::new(class),
                        args: Box::new(args),
                        state: None,
                    });
                }
                NEWOBJ_EX => {
                    let _kwargs = self.pop()?;
                    let args = self.pop()?;
                    let class = self.pop()?;
                    self.stack.push(PickleValue::Object {
                        class: Box::new(class),
                        args: Box::new(args),
                        state: None,
                    });
                }
                BUILD => {
                    let new_state = self.pop()?;
                    match self.stack.last_mut() {
                        Some(PickleValue::Object { state, .. }) => *state = Some(Box::new(new_state)),
                        Some(PickleValue::Dict(entries)) => match new_state {
                            PickleValue::Dict(extra) => entries.extend(extra),
                            _ => return Err(self.error("BUILD on dict needs a dict state")),
                        },
                        _ => return Err(self.error("BUILD target is not an object")),
                    }
                }

                other => {
                    return Err(self.error(format!("unsupported opcode 0x{:02x}", other)));
                }
            }
        }
    }

    fn pop(&mut self) -> Result<PickleValue, BellandeError> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => Err(self.error("stack underflow")),
        }
    }

    fn top(&self) -> Result<&PickleValue, BellandeError> {
        match self.stack.last() {
            Some(value) => Ok(value),
            None => Err(self.error("stack underflow")),
        }
    }

    fn pop_mark(&mut self) -> Result<Vec<PickleValue>, BellandeError> {
        match self.metastack.pop() {
            Some(previous) => Ok(std::mem::replace(&mut self.stack, previous)),
            None => Err(self.error("MARK not found")),
        }
    }

    fn append(&mut self, items: Vec<PickleValue>) -> Result<(), BellandeError> {
        match self.stack.last_mut() {
            Some(PickleValue::List(list)) => {
                list.extend(items);
                Ok(())
            }
            Some(other) => {
                let kind = other.type_name();
                Err(self.error(format!("cannot append to {}", kind)))
            }
            None => Err(self.error("stack underflow")),
        }
    }

    fn set_items(&self, target: &mut PickleValue, items: Vec<PickleValue>) -> Result<(), BellandeError> {
        let kind = target.type_name();
        let PickleValue::Dict(entries) = target else {
            return Err(self.error(format!("cannot set items on {}", kind)));
        };
        if items.len() % 2 != 0 {
            return Err(self.error("odd number of items for dict"));
        }

        let mut iter = items.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
        Ok(())
    }

    fn memo_get(&mut self, index: u32) -> Result<(), BellandeError> {
        match self.memo.get(&index) {
            Some(value) => {
                let value = value.clone();
                self.stack.push(value);
                Ok(())
            }
            None => Err(self.error(format!("memo key {} not found", index))),
        }
    }

    fn memo_put(&mut self, index: u32) -> Result<(), BellandeError> {
        let top = self.top()?.clone();
        self.memo.insert(index, top);
        Ok(())
    }

    fn length(&self, len: i64) -> Result<usize, BellandeError> {
        usize::try_from(len).map_err(|_| self.error(format!("invalid length {}", len)))
    }

    fn read_line(&mut self) -> Result<String, BellandeError> {
        let line = self.read_raw_line()?;
        let line = line.strip_suffix(b"\r").unwrap_or(&line);
        Ok(latin1(line))
    }

    fn parse_int(&self, text: &str) -> Result<i64, BellandeError> {
        text.trim()
            .parse::<i64>()
            .map_err(|_| self.error(format!("invalid integer literal {:?}", text)))
    }

    fn decode_long(&self, bytes: &[u8]) -> Result<i64, BellandeError> {
        if bytes.is_empty() {
            return Ok(0);
        }
        if bytes.len() > 8 {
            return Err(self.error(format!("{}-byte integer does not fit in i64", bytes.len())));
        }

        let negative = bytes[bytes.len() - 1] & 0x80 != 0;
        let mut buf = if negative { [0xff; 8] } else { [0; 8] };
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(i64::from_le_bytes(buf))
    }

    fn py2_string(&self, bytes: Vec<u8>) -> Result<PickleValue, BellandeError> {
        if self.decoding == StringDecoding::Ascii && !bytes.is_ascii() {
            return Err(self.error(
                "non-ASCII byte string; decode with StringDecoding::Latin1",
            ));
        }
        Ok(PickleValue::Bytes(Arc::new(bytes)))
    }

    fn utf8(&mut self, len: usize) -> Result<PickleValue, BellandeError> {
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes)
            .map(PickleValue::String)
            .map_err(|_| self.error("invalid UTF-8 in unicode string"))
    }

    /// Undoes the `repr()` quoting used by the protocol 0 `STRING` opcode.
    fn unquote(&self, line: &[u8]) -> Result<Vec<u8>, BellandeError> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let quoted = line.len() >= 2
            && (line[0] == b'\'' || line[0] == b'"')
            && line[line.len() - 1] == line[0];
        if !quoted {
            return Err(self.error("STRING argument is not quoted"));
        }

        let body = &line[1..line.len() - 1];
        let mut out = Vec::with_capacity(body.len());
        let mut i = 0;
        while i < body.len() {
            if body[i] != b'\\' || i + 1 == body.len() {
                out.push(body[i]);
                i += 1;
                continue;
            }
            let escaped = body[i + 1];
            i += 2;
            match escaped {
                b'\\' => out.push(b'\\'),
                b'\'' => out.push(b'\''),
                b'"' => out.push(b'"'),
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'0' => out.push(0),
                b'x' if i + 2 <= body.len() => {
                    let hex = std::str::from_utf8(&body[i..i + 2])
                        .ok()
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                        .ok_or_else(|| self.error("invalid \\x escape"))?;
                    out.push(hex);
                    i += 2;
                }
                other => {
                    out.push(b'\\');
                    out.push(other);
                }
            }
        }
        Ok(out)
    }

    /// Decodes the `raw-unicode-escape` payload of the protocol 0 `UNICODE` opcode.
    fn raw_unicode_escape(&self, line: &[u8]) -> Result<String, BellandeError> {
        let mut out = String::with_capacity(line.len());
        let mut i = 0;
        while i < line.len() {
            let width = match (line[i], line.get(i + 1)) {
                (b'\\', Some(b'u')) => 4,
                (b'\\', Some(b'U')) => 8,
                _ => 0,
            };
            if width == 0 || i + 2 + width > line.len() {
                out.push(line[i] as char);
                i += 1;
                continue;
            }

            let digits = &line[i + 2..i + 2 + width];
            let ch = std::str::from_utf8(digits)
                .ok()
                .and_then(|h| u32::from_str_radix(h, 16).ok())
                .and_then(char::from_u32)
                .ok_or_else(|| self.error("invalid unicode escape"))?;
            out.push(ch);
            i += 2 + width;
        }
        Ok(out)
    }
}
