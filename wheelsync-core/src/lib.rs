//! The document store wheelsync synchronizes through.
//!
//! Documents live at slash-separated paths and hold typed [Value] fields.
//! Every change is pushed to subscribers as a full snapshot of the document
//! or collection.

mod clock;
mod memory;
mod path;
mod store;
mod subscription;
mod update;
mod util;
mod value;

pub use clock::*;
pub use memory::*;
pub use path::*;
pub use store::*;
pub use subscription::*;
pub use update::*;
pub use util::*;
pub use value::*;
