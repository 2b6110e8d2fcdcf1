//! Declarative mapping descriptions for resultmap.
//!
//! A [`ResultMap`] says how rows of one shape become objects of one type;
//! [`MappedStatement`] ties result maps to the result sets of one statement;
//! [`Configuration`] holds everything, together with the global [`Settings`].

pub mod config;
pub mod result_map;
pub mod result_mapping;
pub mod statement;

pub use config::{AutoMappingBehavior, Configuration, Settings, UnknownColumnBehavior};
pub use result_map::{Discriminator, ResultMap, ResultMapBuilder};
pub use result_mapping::{FetchType, ResultFlag, ResultMapping};
pub use statement::MappedStatement;
