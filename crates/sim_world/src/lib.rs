//! # sim_world
//!
//! World descriptions for the simulation server.
//!
//! A description file is JSON holding one or more worlds. Each world carries
//! physics settings, a tree of entities with JSON component values, includes
//! that pull entity trees in from other files, and the systems ("plugins") to
//! attach.
//!
//! - [`description`] — the serde data model ([`WorldDescription`], [`WorldSpec`], ...).
//! - [`parser`] — loading text or files, expanding includes through an
//!   [`AssetResolver`], and the lightweight [`world_names_from_file`] probe.
//! - [`validate`] — structural checks producing an ordered error list.

pub mod description;
pub mod error;
pub mod parser;
pub mod validate;

pub use description::{
    EntityDescription, IncludeDescription, PhysicsDescription, PluginDescription,
    WorldDescription, WorldSpec,
};
pub use error::DescriptionError;
pub use validate::validate;
pub use parser::{
    AssetResolver, description_file_in, load_file, load_str, load_str_in, world_names_from_file,
};
