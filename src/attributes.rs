//! Resource markers.
//!
//! A resource carries its markers explicitly as part of registration,
//! rather than attaching them via decorators and reading them back through
//! reflection.

use std::collections::HashSet;

pub const SINGLETON: &str = "singleton";
pub const TARGET: &str = "bakery-target";
pub const DEFAULT: &str = "bakery-default";
pub const SETUP: &str = "bakery-setup";
pub const TEMP: &str = "bakery-temp";
pub const NOCLEAN: &str = "bakery-noclean";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    markers: HashSet<&'static str>,
    pub display_name: Option<String>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, marker: &'static str) -> Self {
        self.markers.insert(marker);
        self
    }

    pub fn has(&self, marker: &str) -> bool {
        self.markers.contains(marker)
    }

    pub fn is_singleton(&self) -> bool {
        self.has(SINGLETON)
    }

    pub fn is_target(&self) -> bool {
        self.has(TARGET)
    }

    pub fn is_default(&self) -> bool {
        self.has(DEFAULT)
    }

    pub fn is_setup(&self) -> bool {
        self.has(SETUP)
    }

    pub fn is_temp(&self) -> bool {
        self.has(TEMP)
    }

    pub fn is_noclean(&self) -> bool {
        self.has(NOCLEAN)
    }
}
