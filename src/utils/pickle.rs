// Enough of the pickle protocol to read the python version of the CIFAR batches.
// Python 2 strings come back as bytes, the same as loading with `encoding="bytes"`.
use crate::utils::error::{Error, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

macro_rules! bail {
    ($($arg:tt)*) => {
        return Err(Error::Pickle(format!($($arg)*)))
    };
}

// https://github.com/python/cpython/blob/main/Lib/pickletools.py
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum OpCode {
    Proto = 0x80,
    Frame = 0x95,
    Stop = b'.',
    Mark = b'(',
    Global = b'c',
    StackGlobal = 0x93,
    Reduce = b'R',
    Build = b'b',
    NewObj = 0x81,
    BinPut = b'q',
    LongBinPut = b'r',
    Memoize = 0x94,
    BinGet = b'h',
    LongBinGet = b'j',
    EmptyTuple = b')',
    Tuple = b't',
    Tuple1 = 0x85,
    Tuple2 = 0x86,
    Tuple3 = 0x87,
    EmptyList = b']',
    List = b'l',
    Append = b'a',
    Appends = b'e',
    EmptyDict = b'}',
    Dict = b'd',
    SetItem = b's',
    SetItems = b'u',
    BinInt = b'J',
    BinInt1 = b'K',
    BinInt2 = b'M',
    Long1 = 0x8a,
    BinFloat = b'G',
    None = b'N',
    NewTrue = 0x88,
    NewFalse = 0x89,
    BinString = b'T',
    ShortBinString = b'U',
    BinUnicode = b'X',
    ShortBinUnicode = 0x8c,
    BinUnicode8 = 0x8d,
    BinBytes = b'B',
    ShortBinBytes = b'C',
    BinBytes8 = 0x8e,
}

impl TryFrom<u8> for OpCode {
    type Error = Error;
    fn try_from(value: u8) -> Result<Self> {
        let op = match value {
            0x80 => Self::Proto,
            0x95 => Self::Frame,
            b'.' => Self::Stop,
            b'(' => Self::Mark,
            b'c' => Self::Global,
            0x93 => Self::StackGlobal,
            b'R' => Self::Reduce,
            b'b' => Self::Build,
            0x81 => Self::NewObj,
            b'q' => Self::BinPut,
            b'r' => Self::LongBinPut,
            0x94 => Self::Memoize,
            b'h' => Self::BinGet,
            b'j' => Self::LongBinGet,
            b')' => Self::EmptyTuple,
            b't' => Self::Tuple,
            0x85 => Self::Tuple1,
            0x86 => Self::Tuple2,
            0x87 => Self::Tuple3,
            b']' => Self::EmptyList,
            b'l' => Self::List,
            b'a' => Self::Append,
            b'e' => Self::Appends,
            b'}' => Self::EmptyDict,
            b'd' => Self::Dict,
            b's' => Self::SetItem,
            b'u' => Self::SetItems,
            b'J' => Self::BinInt,
            b'K' => Self::BinInt1,
            b'M' => Self::BinInt2,
            0x8a => Self::Long1,
            b'G' => Self::BinFloat,
            b'N' => Self::None,
            0x88 => Self::NewTrue,
            0x89 => Self::NewFalse,
            b'T' => Self::BinString,
            b'U' => Self::ShortBinString,
            b'X' => Self::BinUnicode,
            0x8c => Self::ShortBinUnicode,
            0x8d => Self::BinUnicode8,
            b'B' => Self::BinBytes,
            b'C' => Self::ShortBinBytes,
            0x8e => Self::BinBytes8,
            other => return Err(Error::UnknownOpCode(other)),
        };
        Ok(op)
    }
}

fn read_to_newline<R: BufRead>(r: &mut R) -> Result<String> {
    let mut data: Vec<u8> = Vec::with_capacity(32);
    r.read_until(b'\n', &mut data)?;
    data.pop();
    if data.last() == Some(&b'\r') {
        data.pop();
    }
    Ok(String::from_utf8_lossy(&data).to_string())
}

fn read_bytes<R: BufRead>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut data = vec![0u8; len];
    r.read_exact(&mut data)?;
    Ok(data)
}

fn read_unicode<R: BufRead>(r: &mut R, len: usize) -> Result<String> {
    let data = read_bytes(r, len)?;
    String::from_utf8(data).map_err(|err| Error::Pickle(format!("invalid utf-8 string: {err}")))
}

// Two's complement little-endian, as written by LONG1.
fn decode_long(bytes: &[u8]) -> Result<i64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 8 {
        bail!("integer of {} bytes does not fit in 64 bits", bytes.len());
    }
    let fill = if bytes[bytes.len() - 1] & 0x80 != 0 {
        0xff
    } else {
        0x00
    };
    let mut buf = [fill; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Class {
        module_name: String,
        class_name: String,
    },
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Bytes(Vec<u8>),
    Unicode(String),
    Tuple(Vec<Object>),
    List(Vec<Object>),
    Dict(Vec<(Object, Object)>),
    Mark,
    Reduce {
        callable: Box<Object>,
        args: Box<Object>,
    },
    Build {
        obj: Box<Object>,
        state: Box<Object>,
    },
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Class { .. } => "class",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::None => "none",
            Self::Bytes(_) => "bytes",
            Self::Unicode(_) => "str",
            Self::Tuple(_) => "tuple",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Mark => "mark",
            Self::Reduce { .. } => "reduce",
            Self::Build { .. } => "build",
        }
    }

    fn unexpected(expected: &'static str, got: &Object) -> Error {
        Error::UnexpectedObject {
            expected,
            got: got.type_name().to_string(),
        }
    }

    /// Text of a `str` or `bytes` key, without copying.
    pub fn key_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b.as_slice()),
            Self::Unicode(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Looks up a dict entry. Both `b"key"` and `"key"` match `key`.
    pub fn get(&self, key: &str) -> Option<&Object> {
        match self {
            Self::Dict(items) => items
                .iter()
                .rev()
                .find(|(k, _)| k.key_bytes() == Some(key.as_bytes()))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Removes and returns a dict entry, see [Object::get].
    pub fn take(&mut self, key: &str) -> Result<Object> {
        match self {
            Self::Dict(items) => {
                let pos = items
                    .iter()
                    .rposition(|(k, _)| k.key_bytes() == Some(key.as_bytes()))
                    .ok_or_else(|| Error::MissingKey(key.to_string()))?;
                Ok(items.remove(pos).1)
            }
            other => Err(Self::unexpected("dict", other)),
        }
    }

    fn is_class(&self, module: &[&str], class: &str) -> bool {
        matches!(self, Self::Class { module_name, class_name }
            if module.contains(&module_name.as_str()) && class_name == class)
    }
}

impl TryFrom<Object> for String {
    type Error = Error;
    fn try_from(value: Object) -> Result<Self> {
        match value {
            Object::Unicode(s) => Ok(s),
            Object::Bytes(b) => String::from_utf8(b)
                .map_err(|err| Error::Pickle(format!("invalid utf-8 string: {err}"))),
            other => Err(Object::unexpected("str", &other)),
        }
    }
}

impl TryFrom<Object> for i64 {
    type Error = Error;
    fn try_from(value: Object) -> Result<Self> {
        match value {
            Object::Int(v) => Ok(v),
            Object::Bool(b) => Ok(b as i64),
            other => Err(Object::unexpected("int", &other)),
        }
    }
}

impl TryFrom<Object> for usize {
    type Error = Error;
    fn try_from(value: Object) -> Result<Self> {
        match value {
            Object::Int(v) if v >= 0 => Ok(v as usize),
            other => Err(Object::unexpected("non-negative int", &other)),
        }
    }
}

impl<T: TryFrom<Object, Error = Error>> TryFrom<Object> for Vec<T> {
    type Error = Error;
    fn try_from(value: Object) -> Result<Self> {
        match value {
            Object::List(values) | Object::Tuple(values) => {
                values.into_iter().map(T::try_from).collect()
            }
            other => Err(Object::unexpected("list", &other)),
        }
    }
}

#[derive(Debug)]
pub struct Stack {
    stack: Vec<Object>,
    memo: HashMap<u32, Object>,
}

impl Stack {
    pub fn empty() -> Self {
        Self {
            stack: Vec::with_capacity(512),
            memo: HashMap::new(),
        }
    }

    pub fn read_loop<R: BufRead>(&mut self, r: &mut R) -> Result<()> {
        while !self.read(r)? {}
        Ok(())
    }

    pub fn finalize(mut self) -> Result<Object> {
        self.pop()
    }

    fn push(&mut self, obj: Object) {
        self.stack.push(obj)
    }

    fn pop(&mut self) -> Result<Object> {
        match self.stack.pop() {
            None => bail!("unexpected empty stack"),
            Some(obj) => Ok(obj),
        }
    }

    fn last(&mut self) -> Result<&mut Object> {
        match self.stack.last_mut() {
            None => bail!("unexpected empty stack"),
            Some(obj) => Ok(obj),
        }
    }

    fn build(&mut self) -> Result<()> {
        let state = self.pop()?;
        let obj = self.pop()?;
        let built = match (obj, state) {
            (Object::Dict(mut obj), Object::Dict(mut state)) => {
                obj.append(&mut state);
                Object::Dict(obj)
            }
            (obj, state) => Object::Build {
                obj: Box::new(obj),
                state: Box::new(state),
            },
        };
        self.push(built);
        Ok(())
    }

    fn reduce(&mut self) -> Result<()> {
        let args = self.pop()?;
        let callable = self.pop()?;
        let reduced = if callable.is_class(&["collections"], "OrderedDict") {
            Object::Dict(vec![])
        } else {
            Object::Reduce {
                callable: Box::new(callable),
                args: Box::new(args),
            }
        };
        self.push(reduced);
        Ok(())
    }

    fn memo_get(&self, id: u32) -> Result<Object> {
        match self.memo.get(&id) {
            None => bail!("missing object in memo {id}"),
            Some(obj) => Ok(obj.clone()),
        }
    }

    fn memo_put(&mut self, id: u32) -> Result<()> {
        let obj = self.last()?.clone();
        self.memo.insert(id, obj);
        Ok(())
    }

    fn pop_to_marker(&mut self) -> Result<Vec<Object>> {
        let mark_idx = self.stack.iter().rposition(|obj| obj == &Object::Mark);
        match mark_idx {
            Some(mark_idx) => {
                let objs = self.stack.split_off(mark_idx + 1);
                self.stack.pop();
                Ok(objs)
            }
            None => bail!("marker object not found"),
        }
    }

    fn pairs(objs: Vec<Object>) -> Result<Vec<(Object, Object)>> {
        if objs.len() % 2 != 0 {
            bail!("setitems: not an even number of objects")
        }
        let mut pairs = Vec::with_capacity(objs.len() / 2);
        let mut iter = objs.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    /// Executes one op-code, returns `true` once STOP is reached.
    pub fn read<R: BufRead>(&mut self, r: &mut R) -> Result<bool> {
        let op_code = OpCode::try_from(r.read_u8()?)?;
        match op_code {
            OpCode::Proto => {
                let version = r.read_u8()?;
                if version > 5 {
                    bail!("unsupported protocol {version}");
                }
            }
            OpCode::Frame => {
                r.read_u64::<LittleEndian>()?;
            }
            OpCode::Stop => return Ok(true),
            OpCode::Mark => self.push(Object::Mark),
            OpCode::Global => {
                let module_name = read_to_newline(r)?;
                let class_name = read_to_newline(r)?;
                self.push(Object::Class {
                    module_name,
                    class_name,
                })
            }
            OpCode::StackGlobal => {
                let class_name = String::try_from(self.pop()?)?;
                let module_name = String::try_from(self.pop()?)?;
                self.push(Object::Class {
                    module_name,
                    class_name,
                })
            }
            OpCode::Reduce | OpCode::NewObj => self.reduce()?,
            OpCode::Build => self.build()?,
            OpCode::BinPut => {
                let id = r.read_u8()?;
                self.memo_put(id as u32)?
            }
            OpCode::LongBinPut => {
                let id = r.read_u32::<LittleEndian>()?;
                self.memo_put(id)?
            }
            OpCode::Memoize => {
                let id = self.memo.len() as u32;
                self.memo_put(id)?
            }
            OpCode::BinGet => {
                let id = r.read_u8()?;
                let obj = self.memo_get(id as u32)?;
                self.push(obj)
            }
            OpCode::LongBinGet => {
                let id = r.read_u32::<LittleEndian>()?;
                let obj = self.memo_get(id)?;
                self.push(obj)
            }
            OpCode::EmptyTuple => self.push(Object::Tuple(vec![])),
            OpCode::Tuple => {
                let objs = self.pop_to_marker()?;
                self.push(Object::Tuple(objs))
            }
            OpCode::Tuple1 => {
                let obj = self.pop()?;
                self.push(Object::Tuple(vec![obj]))
            }
            OpCode::Tuple2 => {
                let obj2 = self.pop()?;
                let obj1 = self.pop()?;
                self.push(Object::Tuple(vec![obj1, obj2]))
            }
            OpCode::Tuple3 => {
                let obj3 = self.pop()?;
                let obj2 = self.pop()?;
                let obj1 = self.pop()?;
                self.push(Object::Tuple(vec![obj1, obj2, obj3]))
            }
            OpCode::EmptyList => self.push(Object::List(vec![])),
            OpCode::List => {
                let objs = self.pop_to_marker()?;
                self.push(Object::List(objs))
            }
            OpCode::Append => {
                let value = self.pop()?;
                match self.last()? {
                    Object::List(list) => list.push(value),
                    other => bail!("append: expected a list, got {}", other.type_name()),
                }
            }
            OpCode::Appends => {
                let mut objs = self.pop_to_marker()?;
                match self.last()? {
                    Object::List(list) => list.append(&mut objs),
                    other => bail!("appends: expected a list, got {}", other.type_name()),
                }
            }
            OpCode::EmptyDict => self.push(Object::Dict(vec![])),
            OpCode::Dict => {
                let objs = self.pop_to_marker()?;
                let pairs = Self::pairs(objs)?;
                self.push(Object::Dict(pairs))
            }
            OpCode::SetItem => {
                let value = self.pop()?;
                let key = self.pop()?;
                match self.last()? {
                    Object::Dict(d) => d.push((key, value)),
                    other => bail!("setitem: expected a dict, got {}", other.type_name()),
                }
            }
            OpCode::SetItems => {
                let objs = self.pop_to_marker()?;
                let mut pairs = Self::pairs(objs)?;
                match self.last()? {
                    Object::Dict(d) => d.append(&mut pairs),
                    other => bail!("setitems: expected a dict, got {}", other.type_name()),
                }
            }
            OpCode::BinInt => {
                let arg = r.read_i32::<LittleEndian>()?;
                self.push(Object::Int(arg as i64))
            }
            OpCode::BinInt1 => {
                let arg = r.read_u8()?;
                self.push(Object::Int(arg as i64))
            }
            OpCode::BinInt2 => {
                let arg = r.read_u16::<LittleEndian>()?;
                self.push(Object::Int(arg as i64))
            }
            OpCode::Long1 => {
                let len = r.read_u8()? as usize;
                let data = read_bytes(r, len)?;
                self.push(Object::Int(decode_long(&data)?))
            }
            OpCode::BinFloat => {
                let arg = r.read_f64::<BigEndian>()?;
                self.push(Object::Float(arg))
            }
            OpCode::None => self.push(Object::None),
            OpCode::NewTrue => self.push(Object::Bool(true)),
            OpCode::NewFalse => self.push(Object::Bool(false)),
            OpCode::BinString => {
                let len = r.read_i32::<LittleEndian>()?;
                if len < 0 {
                    bail!("negative string length {len}");
                }
                let data = read_bytes(r, len as usize)?;
                self.push(Object::Bytes(data))
            }
            OpCode::ShortBinString | OpCode::ShortBinBytes => {
                let len = r.read_u8()? as usize;
                let data = read_bytes(r, len)?;
                self.push(Object::Bytes(data))
            }
            OpCode::BinBytes => {
                let len = r.read_u32::<LittleEndian>()? as usize;
                let data = read_bytes(r, len)?;
                self.push(Object::Bytes(data))
            }
            OpCode::BinBytes8 => {
                let len = r.read_u64::<LittleEndian>()? as usize;
                let data = read_bytes(r, len)?;
                self.push(Object::Bytes(data))
            }
            OpCode::BinUnicode => {
                let len = r.read_u32::<LittleEndian>()? as usize;
                let data = read_unicode(r, len)?;
                self.push(Object::Unicode(data))
            }
            OpCode::ShortBinUnicode => {
                let len = r.read_u8()? as usize;
                let data = read_unicode(r, len)?;
                self.push(Object::Unicode(data))
            }
            OpCode::BinUnicode8 => {
                let len = r.read_u64::<LittleEndian>()? as usize;
                let data = read_unicode(r, len)?;
                self.push(Object::Unicode(data))
            }
        }
        Ok(false)
    }
}

/// Decodes a single pickled object from `r`.
pub fn read_pickle<R: BufRead>(r: &mut R) -> Result<Object> {
    let mut stack = Stack::empty();
    stack.read_loop(r)?;
    stack.finalize()
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<Object> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_pickle(&mut reader)
}

const MULTIARRAY: &[&str] = &["numpy.core.multiarray", "numpy._core.multiarray"];

/// A numpy array rebuilt from `ndarray.__reduce__` output.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub dtype: String,
    pub fortran_order: bool,
    pub data: Vec<u8>,
}

impl NdArray {
    /// Rows of a 2-D, C-ordered `uint8` array.
    pub fn u8_rows(&self) -> Result<std::slice::Chunks<'_, u8>> {
        if self.dtype != "u1" {
            return Err(Error::UnsupportedDType(self.dtype.clone()));
        }
        let (n, m) = match self.shape.as_slice() {
            &[n, m] => (n, m),
            _ => bail!("expected a 2-D array, got shape {:?}", self.shape),
        };
        if self.fortran_order {
            bail!("fortran-ordered arrays are not supported");
        }
        if n.checked_mul(m) != Some(self.data.len()) {
            return Err(Error::ShapeMismatch {
                buffer_size: self.data.len(),
                shape: self.shape.clone(),
            });
        }
        // chunks() panics on a zero size
        Ok(self.data.chunks(m.max(1)))
    }

    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    fn dtype_descr(obj: Object) -> Result<String> {
        let obj = match obj {
            Object::Build { obj, .. } => *obj,
            obj => obj,
        };
        match obj {
            Object::Reduce { callable, args } if callable.is_class(&["numpy"], "dtype") => {
                let descr = match *args {
                    Object::Tuple(mut args) if !args.is_empty() => {
                        String::try_from(args.swap_remove(0))?
                    }
                    other => return Err(Object::unexpected("dtype arguments", &other)),
                };
                Ok(descr.trim_start_matches(['|', '<', '=']).to_string())
            }
            other => Err(Object::unexpected("numpy dtype", &other)),
        }
    }
}

impl TryFrom<Object> for NdArray {
    type Error = Error;
    fn try_from(value: Object) -> Result<Self> {
        let (obj, state) = match value {
            Object::Build { obj, state } => (*obj, *state),
            other => return Err(Object::unexpected("numpy array", &other)),
        };
        match &obj {
            Object::Reduce { callable, .. } if callable.is_class(MULTIARRAY, "_reconstruct") => {}
            other => return Err(Object::unexpected("numpy array", other)),
        }
        // (version, shape, dtype, is_fortran, raw data)
        let mut state = match state {
            Object::Tuple(state) if state.len() == 5 => state.into_iter(),
            other => return Err(Object::unexpected("numpy array state", &other)),
        };
        let mut next = || state.next().unwrap_or(Object::None);
        let _version = next();
        let shape = Vec::<usize>::try_from(next())?;
        let dtype = Self::dtype_descr(next())?;
        let fortran_order = i64::try_from(next())? != 0;
        let data = match next() {
            Object::Bytes(data) => data,
            // protocol 2 pickles written by python 3 carry the buffer as a latin-1 str
            Object::Unicode(s) => s.chars().map(|c| c as u32 as u8).collect(),
            other => return Err(Object::unexpected("array buffer", &other)),
        };
        Ok(Self {
            shape,
            dtype,
            fortran_order,
            data,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    /// Emits pickle op-codes, enough to fake CIFAR batch files.
    #[derive(Debug, Default)]
    pub struct PickleWriter {
        pub buf: Vec<u8>,
    }

    impl PickleWriter {
        pub fn new() -> Self {
            let mut w = Self::default();
            w.buf.extend_from_slice(&[0x80, 2]);
            w
        }
        pub fn op(&mut self, op: u8) -> &mut Self {
            self.buf.push(op);
            self
        }
        pub fn global(&mut self, module: &str, class: &str) -> &mut Self {
            self.buf.push(b'c');
            self.buf.extend_from_slice(format!("{module}\n{class}\n").as_bytes());
            self
        }
        pub fn int(&mut self, v: i32) -> &mut Self {
            if (0..256).contains(&v) {
                self.buf.extend_from_slice(&[b'K', v as u8]);
            } else if (0..65536).contains(&v) {
                self.buf.push(b'M');
                self.buf.extend_from_slice(&(v as u16).to_le_bytes());
            } else {
                self.buf.push(b'J');
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            self
        }
        pub fn py2_str(&mut self, data: &[u8]) -> &mut Self {
            if data.len() < 256 {
                self.buf.extend_from_slice(&[b'U', data.len() as u8]);
            } else {
                self.buf.push(b'T');
                self.buf.extend_from_slice(&(data.len() as i32).to_le_bytes());
            }
            self.buf.extend_from_slice(data);
            self
        }
        pub fn unicode(&mut self, s: &str) -> &mut Self {
            self.buf.push(b'X');
            self.buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            self.buf.extend_from_slice(s.as_bytes());
            self
        }
        pub fn put(&mut self, id: u8) -> &mut Self {
            self.buf.extend_from_slice(&[b'q', id]);
            self
        }
        pub fn get(&mut self, id: u8) -> &mut Self {
            self.buf.extend_from_slice(&[b'h', id]);
            self
        }
        /// `numpy.ndarray` of `uint8` in the layout numpy uses for protocol 2.
        pub fn u8_array(&mut self, rows: usize, cols: usize, data: &[u8]) -> &mut Self {
            self.global("numpy.core.multiarray", "_reconstruct")
                .global("numpy", "ndarray")
                .int(0)
                .op(0x85)
                .py2_str(b"b")
                .op(0x87)
                .op(b'R')
                .op(b'(')
                .int(1)
                .int(rows as i32)
                .int(cols as i32)
                .op(0x86)
                .global("numpy", "dtype")
                .py2_str(b"u1")
                .int(0)
                .int(1)
                .op(0x87)
                .op(b'R')
                .op(b'(')
                .int(3)
                .py2_str(b"|")
                .op(b'N')
                .op(b'N')
                .op(b'N')
                .int(-1)
                .int(-1)
                .int(0)
                .op(b't')
                .op(b'b')
                .op(0x89)
                .py2_str(data)
                .op(b't')
                .op(b'b')
        }
        pub fn finish(&mut self) -> Vec<u8> {
            self.buf.push(b'.');
            std::mem::take(&mut self.buf)
        }
    }
}
