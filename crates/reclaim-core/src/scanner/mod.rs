pub mod walk;

pub use walk::{enumerate, resolve_root, FileFilter};
