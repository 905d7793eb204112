//! Binned dataset collaborator: bin mappers, dataset, and builder.

mod bin_mapper;
mod builder;
mod dataset;

pub use bin_mapper::{BinMapper, BinType, MissingType};
pub use builder::{BuildError, DatasetBuilder};
pub use dataset::{Dataset, HistLayout, HistogramEntry, TrainScratch, HIST_ENTRY_SIZE};
