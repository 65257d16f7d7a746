mod registry;

pub use registry::{
    TagRegistry, CO_TAG, O2_TAG, PUMP_FLOW_TAG, REQUIRED_TAGS, SAMPLE_TEMP_TAG,
};
