//! Request body inputs and form encoding.
//!
//! A request's `data` can be pre-encoded text or bytes, an ordered list of
//! form fields, or a readable stream. Form fields are serialized as
//! `application/x-www-form-urlencoded`; streams are handed to the transport
//! untouched.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::error::{Error, Result};

/// A single form key or value: text, or raw bytes sent as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Bytes(Bytes),
}

impl Value {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::Text(s) => s.as_bytes(),
            Value::Bytes(b) => b,
        }
    }

    /// Text form of the value; invalid UTF-8 is replaced.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

macro_rules! value_from_display {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Text(v.to_string())
            }
        })*
    };
}

value_from_display!(i32, i64, u32, u64, usize, f64, bool, char);

/// The value side of a form field.
///
/// `Null` fields and `None` list members are dropped during encoding; a
/// `Many` value expands into one pair per member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    One(Value),
    Many(Vec<Option<Value>>),
}

impl FieldValue {
    /// The values this field contributes to an encoded form, in order.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            FieldValue::Null => Vec::new(),
            FieldValue::One(v) => vec![v],
            FieldValue::Many(vs) => vs.iter().flatten().collect(),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::One(v)
    }
}

macro_rules! field_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FieldValue {
                fn from(v: $t) -> Self {
                    FieldValue::One(v.into())
                }
            }

            impl From<Option<$t>> for FieldValue {
                fn from(v: Option<$t>) -> Self {
                    v.map_or(FieldValue::Null, |v| FieldValue::One(v.into()))
                }
            }

            impl From<Vec<$t>> for FieldValue {
                fn from(vs: Vec<$t>) -> Self {
                    FieldValue::Many(vs.into_iter().map(|v| Some(v.into())).collect())
                }
            }

            impl From<Vec<Option<$t>>> for FieldValue {
                fn from(vs: Vec<Option<$t>>) -> Self {
                    FieldValue::Many(vs.into_iter().map(|v| v.map(Into::into)).collect())
                }
            }
        )*
    };
}

field_value_from!(&str, String, Bytes, i32, i64, u32, u64, usize, f64, bool);

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::One(v.into())
    }
}

/// Ordered form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    fields: Vec<(Value, FieldValue)>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<Value>, value: impl Into<FieldValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<Value>, value: impl Into<FieldValue>) {
        self.fields.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[(Value, FieldValue)] {
        &self.fields
    }

    /// Flattens the form into `(key, value)` pairs, expanding lists and
    /// dropping nulls.
    pub fn pairs(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.fields
            .iter()
            .flat_map(|(k, v)| v.values().into_iter().map(move |v| (k, v)))
    }

    /// Serializes as `application/x-www-form-urlencoded`, repeating keys for
    /// multi-valued fields.
    pub fn urlencode(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.pairs() {
            if !out.is_empty() {
                out.push('&');
            }
            out.extend(form_urlencoded::byte_serialize(key.as_bytes()));
            out.push('=');
            out.extend(form_urlencoded::byte_serialize(value.as_bytes()));
        }
        out
    }
}

impl<K: Into<Value>, V: Into<FieldValue>> FromIterator<(K, V)> for Form {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut form = Form::new();
        for (k, v) in iter {
            form.push(k, v);
        }
        form
    }
}

impl<K: Into<Value>, V: Into<FieldValue>> From<Vec<(K, V)>> for Form {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<Value>, V: Into<FieldValue>> From<HashMap<K, V>> for Form {
    fn from(map: HashMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<Value>, V: Into<FieldValue>> From<BTreeMap<K, V>> for Form {
    fn from(map: BTreeMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

/// Query parameters to append to a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Params {
    /// Already encoded; appended verbatim.
    Encoded(String),
    Form(Form),
}

impl Default for Params {
    fn default() -> Self {
        Params::Form(Form::new())
    }
}

impl Params {
    /// Encodes the parameters; pre-encoded strings are returned unchanged.
    pub fn encode(&self) -> String {
        match self {
            Params::Encoded(s) => s.clone(),
            Params::Form(form) => form.urlencode(),
        }
    }
}

impl From<&str> for Params {
    fn from(s: &str) -> Self {
        Params::Encoded(s.to_string())
    }
}

impl From<String> for Params {
    fn from(s: String) -> Self {
        Params::Encoded(s)
    }
}

impl From<Form> for Params {
    fn from(form: Form) -> Self {
        Params::Form(form)
    }
}

/// A readable request body source.
///
/// Only `Read` is required. Sources that can report their position, their
/// remaining length, or seek back to a recorded position override the
/// matching methods; the defaults report "not supported".
pub trait BodyReader: Read + Send {
    /// Current read position, if the source tracks one.
    fn tell(&mut self) -> Option<io::Result<u64>> {
        None
    }

    /// Bytes left to read, when knowable up front.
    fn remaining_len(&mut self) -> Option<u64> {
        None
    }

    fn rewind_to(&mut self, _pos: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "body source cannot seek",
        ))
    }

    /// A file name to advertise in multipart uploads.
    fn file_name(&self) -> Option<&str> {
        None
    }
}

impl<T: AsRef<[u8]> + Send> BodyReader for io::Cursor<T> {
    fn tell(&mut self) -> Option<io::Result<u64>> {
        Some(Ok(self.position()))
    }

    fn remaining_len(&mut self) -> Option<u64> {
        let len = self.get_ref().as_ref().len() as u64;
        Some(len.saturating_sub(self.position()))
    }

    fn rewind_to(&mut self, pos: u64) -> io::Result<()> {
        self.set_position(pos);
        Ok(())
    }
}

impl BodyReader for File {
    fn tell(&mut self) -> Option<io::Result<u64>> {
        Some(self.stream_position())
    }

    fn remaining_len(&mut self) -> Option<u64> {
        let total = self.metadata().ok()?.len();
        let pos = self.stream_position().ok()?;
        Some(total.saturating_sub(pos))
    }

    fn rewind_to(&mut self, pos: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(pos)).map(|_| ())
    }
}

/// A file opened from a path, remembering its base name.
#[derive(Debug)]
pub struct NamedFile {
    file: File,
    name: String,
}

impl NamedFile {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { file, name })
    }
}

impl Read for NamedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl BodyReader for NamedFile {
    fn tell(&mut self) -> Option<io::Result<u64>> {
        self.file.tell()
    }

    fn remaining_len(&mut self) -> Option<u64> {
        self.file.remaining_len()
    }

    fn rewind_to(&mut self, pos: u64) -> io::Result<()> {
        self.file.rewind_to(pos)
    }

    fn file_name(&self) -> Option<&str> {
        // Pseudo-files such as `<stdin>` carry no useful name.
        let name = self.name.as_str();
        if name.is_empty() || (name.starts_with('<') && name.ends_with('>')) {
            None
        } else {
            Some(name)
        }
    }
}

/// Wraps a reader that supports nothing beyond `Read`, so it is always
/// sent with chunked framing.
pub struct PlainReader<R>(pub R);

impl<R: Read> Read for PlainReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Send> BodyReader for PlainReader<R> {}

/// A shared handle to a streaming body.
///
/// Clones refer to the same underlying reader, so a copied prepared message
/// sees the same stream position as the original.
#[derive(Clone)]
pub struct BodyStream {
    inner: Arc<Mutex<Box<dyn BodyReader>>>,
}

impl BodyStream {
    pub fn new(reader: impl BodyReader + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(reader))),
        }
    }

    pub fn tell(&self) -> Option<io::Result<u64>> {
        match self.lock() {
            Ok(mut r) => r.tell(),
            Err(e) => Some(Err(e)),
        }
    }

    pub fn remaining_len(&self) -> Option<u64> {
        self.lock().ok()?.remaining_len()
    }

    pub fn rewind_to(&self, pos: u64) -> io::Result<()> {
        self.lock()?.rewind_to(pos)
    }

    pub fn file_name(&self) -> Option<String> {
        self.lock().ok()?.file_name().map(str::to_string)
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.lock()?.read(buf)
    }

    pub fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.lock()?.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Whether both handles share one reader.
    pub fn same_stream(&self, other: &BodyStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Box<dyn BodyReader>>> {
        self.inner
            .lock()
            .map_err(|_| io::Error::other("body stream lock poisoned"))
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream").finish_non_exhaustive()
    }
}

/// The `data` argument of a request.
#[derive(Debug, Clone, Default)]
pub enum Data {
    #[default]
    Empty,
    Text(String),
    Bytes(Bytes),
    Form(Form),
    Stream(BodyStream),
}

impl Data {
    /// Empty data, including empty text, bytes, and forms.
    ///
    /// Streams always count as present.
    pub fn is_empty(&self) -> bool {
        match self {
            Data::Empty => true,
            Data::Text(s) => s.is_empty(),
            Data::Bytes(b) => b.is_empty(),
            Data::Form(f) => f.is_empty(),
            Data::Stream(_) => false,
        }
    }

    pub fn stream(reader: impl BodyReader + 'static) -> Self {
        Data::Stream(BodyStream::new(reader))
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Data::Text(s.to_string())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Data::Text(s)
    }
}

impl From<Bytes> for Data {
    fn from(b: Bytes) -> Self {
        Data::Bytes(b)
    }
}

impl From<Vec<u8>> for Data {
    fn from(v: Vec<u8>) -> Self {
        Data::Bytes(Bytes::from(v))
    }
}

impl From<Form> for Data {
    fn from(f: Form) -> Self {
        Data::Form(f)
    }
}

impl From<BodyStream> for Data {
    fn from(s: BodyStream) -> Self {
        Data::Stream(s)
    }
}

/// The body of a prepared message.
#[derive(Debug, Clone)]
pub enum Body {
    Bytes(Bytes),
    Stream(BodyStream),
}

impl Body {
    /// The exact length, when it can be computed without reading.
    pub fn len(&self) -> Option<u64> {
        match self {
            Body::Bytes(b) => Some(b.len() as u64),
            Body::Stream(s) => s.remaining_len(),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Bytes(b) => Some(b),
            Body::Stream(_) => None,
        }
    }
}

/// Where a streaming body started, so it can be rewound on redirect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyPosition {
    /// No stream body, or the stream cannot report a position.
    #[default]
    Unset,
    At(u64),
    /// The stream reported a position but the query failed.
    Unknown,
}

/// Encodes `data` into a body, passing text, bytes and streams through.
pub fn encode_data(data: &Data) -> Option<Body> {
    match data {
        Data::Empty => None,
        Data::Text(s) => Some(Body::Bytes(Bytes::from(s.clone()))),
        Data::Bytes(b) => Some(Body::Bytes(b.clone())),
        Data::Form(form) => Some(Body::Bytes(Bytes::from(form.urlencode()))),
        Data::Stream(s) => Some(Body::Stream(s.clone())),
    }
}

/// Records the starting position of a stream body.
///
/// A failed position query is absorbed and recorded as
/// [`BodyPosition::Unknown`] so a later rewind fails explicitly.
pub fn capture_position(stream: &BodyStream) -> BodyPosition {
    match stream.tell() {
        None => BodyPosition::Unset,
        Some(Ok(pos)) => BodyPosition::At(pos),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Could not record body position");
            BodyPosition::Unknown
        }
    }
}

/// Moves `body` back to `position`.
pub fn rewind(body: Option<&Body>, position: BodyPosition) -> Result<()> {
    let Some(Body::Stream(stream)) = body else {
        return Err(Error::UnrewindableBody(
            "Unable to rewind request body for redirect.".to_string(),
        ));
    };
    match position {
        BodyPosition::At(pos) => stream.rewind_to(pos).map_err(|e| {
            Error::UnrewindableBody(format!(
                "An error occurred when rewinding request body for redirect: {e}"
            ))
        }),
        BodyPosition::Unset | BodyPosition::Unknown => Err(Error::UnrewindableBody(
            "Unable to rewind request body for redirect.".to_string(),
        )),
    }
}
