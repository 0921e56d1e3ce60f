// Streaming multipart/form-data encoder.
//
// reqwest's own `multipart::Form` does not expose the encoded length of a
// reader-backed part, and we need the total up front both for the
// `Content-Length` header and for progress reporting. The text parts and
// the framing are rendered into memory; the file itself is streamed.

use crate::error::UploadError;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Chain, Cursor, Read, Take};
use std::path::Path;

/// Name of the form part carrying the file contents.
pub const FILE_FIELD: &str = "upload";

const CRLF: &str = "\r\n";

/// A multipart body ready to be streamed: metadata text parts followed by
/// a single file part named [`FILE_FIELD`].
#[derive(Debug)]
pub struct MultipartBody {
    boundary: String,
    head: Vec<u8>,
    tail: Vec<u8>,
    file: File,
    file_len: u64,
    file_name: String,
    field_names: Vec<String>,
}

impl MultipartBody {
    /// Open `file_path` and frame it together with `fields`, using a random
    /// boundary.
    pub fn new(fields: &BTreeMap<String, String>, file_path: &Path) -> Result<Self, UploadError> {
        Self::with_boundary(gen_boundary(), fields, file_path)
    }

    pub fn with_boundary(
        boundary: impl Into<String>,
        fields: &BTreeMap<String, String>,
        file_path: &Path,
    ) -> Result<Self, UploadError> {
        let boundary = boundary.into();
        let file = File::open(file_path).map_err(|e| UploadError::file_access(file_path, e))?;
        let meta = file
            .metadata()
            .map_err(|e| UploadError::file_access(file_path, e))?;
        if !meta.is_file() {
            return Err(UploadError::file_access(
                file_path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let file_name = file_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| FILE_FIELD.to_string());

        let mut head = String::new();
        for (name, value) in fields {
            head.push_str(&format!("--{}{CRLF}", boundary));
            head.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"{CRLF}{CRLF}",
                escape_quoted(name)
            ));
            head.push_str(value);
            head.push_str(CRLF);
        }
        head.push_str(&format!("--{}{CRLF}", boundary));
        head.push_str(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"{CRLF}",
            FILE_FIELD,
            escape_quoted(&file_name)
        ));
        head.push_str(&format!("Content-Type: application/octet-stream{CRLF}{CRLF}"));

        let tail = format!("{CRLF}--{}--{CRLF}", boundary);

        Ok(MultipartBody {
            boundary,
            head: head.into_bytes(),
            tail: tail.into_bytes(),
            file,
            file_len: meta.len(),
            file_name,
            field_names: fields.keys().cloned().collect(),
        })
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact number of bytes the reader will produce.
    pub fn content_length(&self) -> u64 {
        self.head.len() as u64 + self.file_len + self.tail.len() as u64
    }

    /// Names of the text parts, in the order they are encoded.
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Consume the body into a reader that yields the encoded bytes once,
    /// start to end. The file handle is released when the reader drops.
    pub fn into_reader(self) -> BodyReader {
        let file = FileSection {
            inner: self.file.take(self.file_len),
            remaining: self.file_len,
        };
        BodyReader {
            inner: Cursor::new(self.head).chain(file).chain(Cursor::new(self.tail)),
        }
    }
}

/// Reader over an encoded [`MultipartBody`].
pub struct BodyReader {
    inner: Chain<Chain<Cursor<Vec<u8>>, FileSection>, Cursor<Vec<u8>>>,
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// The file part's payload, held to the length measured at open time.
/// Growth past that length is cut off; truncation is an error.
struct FileSection {
    inner: Take<File>,
    remaining: u64,
}

impl Read for FileSection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank during upload, {} bytes missing", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

fn gen_boundary() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// Percent-encode the characters that would break out of a quoted
// Content-Disposition parameter.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fields() -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("package_id".to_string(), "07a48d23-0025-4720-b2ca-841527fc3fd8".to_string());
        fields.insert("name".to_string(), "1GB-file".to_string());
        fields
    }

    fn scratch_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn encode(body: MultipartBody) -> Vec<u8> {
        let mut out = Vec::new();
        body.into_reader().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn one_part_per_field_plus_the_file() {
        let payload = vec![0xABu8; 3000];
        let file = scratch_file(&payload);
        let body = MultipartBody::with_boundary("xyz", &fields(), file.path()).unwrap();
        assert_eq!(body.field_names(), &["name".to_string(), "package_id".to_string()]);
        assert_eq!(body.file_len(), 3000);

        let encoded = String::from_utf8_lossy(&encode(body)).into_owned();
        assert_eq!(encoded.matches("--xyz\r\n").count(), 3);
        assert_eq!(encoded.matches("Content-Disposition: form-data;").count(), 3);
        assert!(encoded.contains("name=\"package_id\"\r\n\r\n07a48d23-0025-4720-b2ca-841527fc3fd8\r\n"));
        assert!(encoded.contains("name=\"name\"\r\n\r\n1GB-file\r\n"));
        assert_eq!(encoded.matches("name=\"upload\"; filename=").count(), 1);
        assert!(encoded.ends_with("\r\n--xyz--\r\n"));
    }

    #[test]
    fn file_part_carries_exact_file_bytes() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
        let file = scratch_file(&payload);
        let body = MultipartBody::with_boundary("b0undary", &fields(), file.path()).unwrap();
        let announced = body.content_length();
        let encoded = encode(body);
        assert_eq!(encoded.len() as u64, announced);

        let marker = b"Content-Type: application/octet-stream\r\n\r\n";
        let start = encoded
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap()
            + marker.len();
        let end = encoded.len() - b"\r\n--b0undary--\r\n".len();
        assert_eq!(&encoded[start..end], &payload[..]);
    }

    #[test]
    fn file_name_is_the_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1GB.img");
        std::fs::write(&path, b"abc").unwrap();
        let body = MultipartBody::new(&BTreeMap::new(), &path).unwrap();
        assert_eq!(body.file_name(), "1GB.img");
        assert_eq!(body.field_names().len(), 0);
        assert!(body.content_type().starts_with("multipart/form-data; boundary="));
        assert_eq!(body.content_type(), format!("multipart/form-data; boundary={}", body.boundary()));
        let encoded = String::from_utf8(encode(body)).unwrap();
        assert!(encoded.contains("filename=\"1GB.img\""));
    }

    #[test]
    fn random_boundaries_differ() {
        let file = scratch_file(b"x");
        let a = MultipartBody::new(&fields(), file.path()).unwrap();
        let b = MultipartBody::new(&fields(), file.path()).unwrap();
        assert_ne!(a.boundary(), b.boundary());
    }

    #[test]
    fn quotes_in_names_are_escaped() {
        let mut odd = BTreeMap::new();
        odd.insert("we\"ird\r\nname".to_string(), "v".to_string());
        let file = scratch_file(b"x");
        let encoded = String::from_utf8(encode(
            MultipartBody::with_boundary("q", &odd, file.path()).unwrap(),
        ))
        .unwrap();
        assert!(encoded.contains("name=\"we%22ird%0D%0Aname\""));
    }

    #[test]
    fn missing_file_is_a_file_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MultipartBody::new(&fields(), &dir.path().join("absent.img")).unwrap_err();
        assert!(matches!(err, UploadError::FileAccess { .. }));
    }

    #[test]
    fn directory_is_a_file_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MultipartBody::new(&fields(), dir.path()).unwrap_err();
        match err {
            UploadError::FileAccess { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidInput)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_file_fails_instead_of_sending_a_short_body() {
        let file = scratch_file(&[1u8; 5000]);
        let body = MultipartBody::with_boundary("t", &fields(), file.path()).unwrap();
        file.as_file().set_len(100).unwrap();

        let mut out = Vec::new();
        let err = body.into_reader().read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn growth_after_open_is_not_sent() {
        let mut file = scratch_file(&[1u8; 10]);
        let body = MultipartBody::with_boundary("g", &fields(), file.path()).unwrap();
        let announced = body.content_length();
        file.write_all(&[2u8; 50]).unwrap();
        file.flush().unwrap();

        let encoded = encode(body);
        assert_eq!(encoded.len() as u64, announced);
        assert!(!encoded.contains(&2u8));
    }
}
