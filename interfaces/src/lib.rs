pub mod defs;

pub use defs::{EntrySink, NewEntry, RawItem, Source};
