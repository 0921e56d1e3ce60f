// Library root
// -----------
// This crate uploads a file to a data-catalog API as a streamed
// multipart/form-data request. The binary (`main.rs`) wires these modules
// into a one-shot CLI.
//
// Module responsibilities:
// - `config`: where the base URL, token and timeouts come from.
// - `error`: the failure taxonomy shared by every module.
// - `multipart`: the streaming form encoder with a known length.
// - `progress`: the progress sink capability and the counting reader.
// - `api`: the uploader itself and the transport it sends through.
// - `ui`: terminal output (metadata echo, progress bar, status).
pub mod api;
pub mod config;
pub mod error;
pub mod multipart;
pub mod progress;
pub mod ui;

pub use api::{action_url, HttpTransport, OutgoingRequest, PreparedUpload, Transport, UploadRequest, UploadResult, Uploader};
pub use config::UploaderConfig;
pub use error::UploadError;
pub use progress::{NoProgress, ProgressSink};
