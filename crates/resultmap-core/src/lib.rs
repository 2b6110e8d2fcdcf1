//! Core types and traits for resultmap.
//!
//! This crate provides the building blocks the materialization engine works
//! on:
//!
//! - `Value`, `Row` and `ColumnInfo` for cursor data
//! - `ResultCursor` / `StatementResults` and in-memory implementations
//! - `CacheKey`, the ordered row identity key
//! - `ConverterRegistry` for column value conversion
//! - `TypeRegistry` descriptors standing in for reflection
//! - `ObjectGraph`, `MetaObject` and `ObjectFactory` for the produced objects
//! - `PendingLoad` / `LazyLoader` for deferred sub-queries

pub mod accessor;
pub mod cache_key;
pub mod convert;
pub mod cursor;
pub mod error;
pub mod factory;
pub mod lazy;
pub mod meta;
pub mod object;
pub mod row;
pub mod types;
pub mod value;

pub use accessor::{MetaObject, ObjectWrapper, PropertyTokenizer};
pub use cache_key::{CacheKey, KeyPart};
pub use convert::{ConverterRegistry, PassThrough, ScalarConverter, ValueConverter};
pub use cursor::{CursorKind, MemoryCursor, MemoryStatement, ResultCursor, StatementResults};
pub use error::{Error, Result};
pub use factory::{DefaultObjectFactory, ObjectFactory};
pub use lazy::{LazyLoadPolicy, LazyLoader, PendingLoad, QueryParameter};
pub use meta::{ConstructorDescriptor, ParamDescriptor, PropertyDescriptor, TypeDescriptor, TypeRegistry};
pub use object::{Object, ObjectGraph, ObjectId, Shape, Slot};
pub use row::{ColumnInfo, FromValue, Row};
pub use types::{SqlType, TargetType};
pub use value::Value;
