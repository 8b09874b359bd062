//! Read and write HEIF (High Efficiency Image File Format) files.
//!
//! The format is an ISOBMFF container carrying HEVC / AVC / L-HEVC
//! coded still images, image collections and image sequences. This
//! crate parses the box structure, the item and track graphs, and the
//! codec elementary streams down to the slice header level, and can
//! assemble new files from coded bitstreams and a content manifest.
//!
//! Reading:
//!
//! ```no_run
//! use heiflib::HeifReader;
//!
//! fn main() -> heiflib::Result<()> {
//!     let reader = HeifReader::open("image.heic")?;
//!     let cover = reader.get_cover_image_item_id(heiflib::reader::META_CONTEXT_ID)?;
//!     let bitstream = reader.get_item_data_with_decoder_parameters(0, cover)?;
//!     // hand `bitstream` to an HEVC decoder.
//!     let _ = bitstream;
//!     Ok(())
//! }
//! ```
//!
//! Writing goes through a declarative manifest, see
//! [`writer::manifest::Manifest`] and [`FileWriter`].
//!
#[macro_use]
mod ioerr;
#[macro_use]
pub mod serialize;
#[macro_use]
#[doc(hidden)]
pub mod macros;

pub mod bitstream;
pub mod boxes;
pub mod error;
pub mod io;
pub mod isobox;
pub mod parse;
pub mod reader;
pub mod timeline;
pub mod track;
pub mod types;
pub mod writer;

pub use crate::error::{Error, Result};
pub use crate::io::HeifFile;
pub use crate::isobox::Heif;
pub use crate::reader::HeifReader;
pub use crate::writer::FileWriter;
