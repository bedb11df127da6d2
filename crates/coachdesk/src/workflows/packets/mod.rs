//! Packet templates and the renderer that turns a client's answers into documents.

pub mod calculations;
pub mod context;
pub mod library;
pub mod render;
pub mod template;


pub use calculations::calculated_fields;
pub use context::{ContextResolver, ContextValue, RenderContext};
pub use library::TemplateLibrary;
pub use render::{
    placeholders, render, render_block, RenderError, RenderedBlock, RenderedPacket,
    RenderedSection,
};
pub use template::{ContentBlock, ContentKind, PacketSection, PacketTemplate, PacketType};
