//! Clients for ModelScope's inference API: asynchronous text-to-image tasks
//! and streamed chat completions.
//!
//! ```no_run
//! use zimage::{ModelScopeClient, ModelScopeConfig};
//!
//! # async fn run() -> zimage::Result<()> {
//! let client = ModelScopeClient::new(ModelScopeConfig::from_env());
//! let request = client.image().request("a cat in a spacesuit");
//! let image = client.image().generate(&request).await?;
//! println!("{}", image);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod modelscope;
pub mod session;
pub mod storage;
pub mod transport;

pub use config::ModelScopeConfig;
pub use error::{Result, ZImageError};
pub use models::*;
pub use modelscope::{ChatClient, ImageClient, ModelScopeClient};
pub use session::Session;
pub use storage::{ImageStore, MemoryImageStore};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, ResponseBody};

pub use tokio_util::sync::CancellationToken;
