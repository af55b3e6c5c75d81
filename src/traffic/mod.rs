//! Traffic infrastructure: lights and sinks

pub mod sink;
pub mod traffic_light;

pub use sink::TrafficSink;
pub use traffic_light::{
    TrafficLight, TrafficLightArrow, TrafficLightColor, TrafficLightManager, TrafficLightPhase,
};
