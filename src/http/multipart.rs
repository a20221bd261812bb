//! `multipart/form-data` encoding for file uploads.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::http::body::{BodyReader, BodyStream, Data, Value};

/// The payload of a file part.
#[derive(Debug, Clone)]
pub enum FileContent {
    Bytes(Bytes),
    Text(String),
    /// Read to the end when the body is encoded.
    Reader(BodyStream),
}

impl FileContent {
    pub fn reader(reader: impl BodyReader + 'static) -> Self {
        FileContent::Reader(BodyStream::new(reader))
    }

    fn guess_name(&self) -> Option<String> {
        match self {
            FileContent::Reader(stream) => stream.file_name(),
            _ => None,
        }
    }

    fn read_all(&self) -> Result<Bytes> {
        Ok(match self {
            FileContent::Bytes(b) => b.clone(),
            FileContent::Text(s) => Bytes::from(s.clone()),
            FileContent::Reader(stream) => Bytes::from(stream.read_to_end()?),
        })
    }
}

impl From<&str> for FileContent {
    fn from(s: &str) -> Self {
        FileContent::Text(s.to_string())
    }
}

impl From<String> for FileContent {
    fn from(s: String) -> Self {
        FileContent::Text(s)
    }
}

impl From<Bytes> for FileContent {
    fn from(b: Bytes) -> Self {
        FileContent::Bytes(b)
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(v: Vec<u8>) -> Self {
        FileContent::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for FileContent {
    fn from(v: &[u8]) -> Self {
        FileContent::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<BodyStream> for FileContent {
    fn from(s: BodyStream) -> Self {
        FileContent::Reader(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FileName {
    /// Take the name from the content, falling back to the field key.
    Derived,
    Explicit(Option<String>),
}

/// One entry of a request's `files`.
///
/// Built from bare content (file name derived), or from tuples of
/// `(file_name, content)`, `(file_name, content, content_type)` and
/// `(file_name, content, content_type, headers)`.
#[derive(Debug, Clone)]
pub struct FilePart {
    name: FileName,
    content: FileContent,
    content_type: Option<String>,
    headers: Vec<(String, String)>,
}

impl FilePart {
    pub fn new(content: impl Into<FileContent>) -> Self {
        Self {
            name: FileName::Derived,
            content: content.into(),
            content_type: None,
            headers: Vec::new(),
        }
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.name = FileName::Explicit(Some(name.into()));
        self
    }

    /// Omits the `filename` parameter instead of deriving one.
    pub fn without_file_name(mut self) -> Self {
        self.name = FileName::Explicit(None);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn resolve_name(&self, key: &str) -> Option<String> {
        match &self.name {
            FileName::Explicit(name) => name.clone(),
            FileName::Derived => self
                .content
                .guess_name()
                .or_else(|| Some(key.to_string())),
        }
    }
}

impl<C: Into<FileContent>> From<(&str, C)> for FilePart {
    fn from((name, content): (&str, C)) -> Self {
        FilePart::new(content).file_name(name)
    }
}

impl<C: Into<FileContent>> From<(&str, C, &str)> for FilePart {
    fn from((name, content, ct): (&str, C, &str)) -> Self {
        FilePart::new(content).file_name(name).content_type(ct)
    }
}

impl<C: Into<FileContent>> From<(&str, C, &str, Vec<(String, String)>)> for FilePart {
    fn from((name, content, ct, headers): (&str, C, &str, Vec<(String, String)>)) -> Self {
        let mut part = FilePart::new(content).file_name(name).content_type(ct);
        part.headers = headers;
        part
    }
}

/// A rendered part, ready to be written between boundaries.
struct Field {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    headers: Vec<(String, String)>,
    data: Bytes,
}

impl Field {
    fn render_headers(&self, buf: &mut BytesMut) {
        buf.put_slice(b"Content-Disposition: form-data; name=\"");
        buf.put_slice(escape_param(&self.name).as_bytes());
        buf.put_u8(b'"');
        if let Some(file_name) = &self.file_name {
            buf.put_slice(b"; filename=\"");
            buf.put_slice(escape_param(file_name).as_bytes());
            buf.put_u8(b'"');
        }
        buf.put_slice(b"\r\n");

        if let Some(ct) = &self.content_type {
            buf.put_slice(b"Content-Type: ");
            buf.put_slice(ct.as_bytes());
            buf.put_slice(b"\r\n");
        }

        for (k, v) in &self.headers {
            if k.eq_ignore_ascii_case("content-disposition")
                || k.eq_ignore_ascii_case("content-type")
            {
                continue;
            }
            buf.put_slice(k.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(v.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
    }
}

// HTML5 form submission escaping for quoted parameters.
fn escape_param(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("%22"),
            '\\' => out.push_str("\\\\"),
            // C0 controls except ESC, as HTML5 form submission encodes them.
            '\u{00}'..='\u{1F}' if c != '\u{1B}' => {
                out.push_str(&format!("%{:02X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Generates a random 32-character hex boundary.
pub fn gen_boundary() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Builds a multipart body from ordinary `data` fields followed by `files`.
///
/// Returns the body and its `multipart/form-data; boundary=...` content
/// type.
pub fn encode_files(files: &[(String, FilePart)], data: &Data) -> Result<(Bytes, String)> {
    encode_files_with_boundary(files, data, &gen_boundary())
}

/// [`encode_files`] with a caller-chosen boundary.
pub fn encode_files_with_boundary(
    files: &[(String, FilePart)],
    data: &Data,
    boundary: &str,
) -> Result<(Bytes, String)> {
    if files.is_empty() {
        return Err(Error::InvalidValue("Files must be provided.".to_string()));
    }

    let mut fields = Vec::new();
    match data {
        Data::Text(_) | Data::Bytes(_) => {
            return Err(Error::InvalidValue("Data must not be a string.".to_string()));
        }
        Data::Stream(_) => return Err(Error::ConflictingBody),
        Data::Empty => {}
        Data::Form(form) => {
            for (key, value) in form.pairs() {
                let data = match value {
                    Value::Bytes(b) => b.clone(),
                    Value::Text(s) => Bytes::from(s.clone()),
                };
                fields.push(Field {
                    name: key.to_text(),
                    file_name: None,
                    content_type: None,
                    headers: Vec::new(),
                    data,
                });
            }
        }
    }

    for (key, part) in files {
        fields.push(Field {
            name: key.clone(),
            file_name: part.resolve_name(key),
            content_type: part.content_type.clone(),
            headers: part.headers.clone(),
            data: part.content.read_all()?,
        });
    }

    let mut buf = BytesMut::new();
    for field in &fields {
        buf.put_slice(b"--");
        buf.put_slice(boundary.as_bytes());
        buf.put_slice(b"\r\n");
        field.render_headers(&mut buf);
        buf.put_slice(&field.data);
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"--");
    buf.put_slice(boundary.as_bytes());
    buf.put_slice(b"--\r\n");

    tracing::trace!(parts = fields.len(), boundary, "Encoded multipart body");

    Ok((
        buf.freeze(),
        format!("multipart/form-data; boundary={boundary}"),
    ))
}
