// Country → region → city aggregation for a story's member articles
pub mod aggregate;
pub mod countries;

pub use aggregate::{
    aggregate_locations, location_confidence, CountrySummary, LocationParams, SubLocation,
};
pub use countries::{CountryNameLookup, IsoCountryNames};
