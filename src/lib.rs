//! Streaming reader for JPA, JPS and ZIP backup archives.
//!
//! Archives may be split across numbered part files (`backup.j01`,
//! `backup.j02`, ..., `backup.jpa`). The reader walks the set as one forward
//! stream and hands every directory, file and symlink to a [`DataSink`] while
//! reporting progress to an [`ExtractObserver`].
//!
//! Supports:
//! - JPA, the plain block-structured format
//! - JPS, its AES-128 encrypted variant (legacy keys and PBKDF2-HMAC-SHA1)
//! - ZIP, stored / deflate / bzip2, including split archives
//!
//! ## Features
//! - `async` - run extractions on tokio's blocking pool ([`task`])
//! - `channel` - forward events over a crossbeam channel ([`ChannelObserver`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use jpa_stream::{CancellationToken, ExtractEvent, ExtractOptions, Unarchiver};
//!
//! # fn main() -> jpa_stream::Result<()> {
//! let mut unarchiver = Unarchiver::open("site-backup.jps", ExtractOptions::default().with_password("s3cret"))?;
//! let token = CancellationToken::new();
//! let progress = unarchiver.extract_to("restore", &mut |event: ExtractEvent| {
//!     if let ExtractEvent::Entity(entity) = event {
//!         println!("{}", entity.stored_path);
//!     }
//! }, &token)?;
//! println!("{:?}", progress.status);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod crc32;
pub mod crypto;
pub mod error;
mod file_media;
pub mod formats;
mod part_reader;
pub mod parsing;
pub mod processor;
pub mod progress;
pub mod sink;
pub mod unarchiver;

#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub mod task;

pub use error::{ArchiveError, Result};
pub use file_media::{discover_part_count, part_path, ArchiveHandle, LocalFileMedia};
pub use formats::{ArchiveFormat, ArchiveParser, EntityDescriptor, FormatParser};
pub use parsing::{CompressionMethod, EntityKind};
pub use part_reader::{PartCursor, PartReader};
pub use progress::{
    ArchiveSummary, CancellationToken, ExtractEvent, ExtractObserver, ExtractionProgress,
    ExtractionStatus, Flow, NoopObserver,
};
pub use sink::{DataSink, FilesystemSink, NullSink};
pub use unarchiver::{ExtractOptions, Unarchiver};

#[cfg(feature = "channel")]
pub use progress::ChannelObserver;
