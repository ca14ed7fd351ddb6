pub mod adapter;
pub mod widget;

pub use adapter::{ChangeSource, EditorAdapter};
pub use widget::EditorWidget;
