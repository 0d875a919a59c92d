//! Filter graph stage for mediaflow.
//!
//! A [`Filterer`] turns named frame streams into other named frame streams
//! through a graph written in the usual chain syntax:
//!
//! ```text
//! [in]scale=320:240,vflip[out]
//! [in]split[a][b];[a]hflip[left];[b]null[right]
//! ```
//!
//! Filters implement [`Filter`]; the built-in set is listed by [`filters()`].

pub mod audio;
pub mod filterer;
pub mod graph;
pub mod multi;
pub mod parser;
pub mod registry;
pub mod traits;
pub mod video;

pub use filterer::{FilterInput, FilterResult, Filterer, FiltererOptions, NamedFrames};
pub use graph::{Graph, InputPad};
pub use parser::{ChainDesc, FilterArgs, FilterDesc, GraphDesc};
pub use registry::{create_filter, filters, find_filter};
pub use traits::{AudioLink, Filter, FilterFactory, FilterInfo, LinkProps, PadCount, VideoLink};
