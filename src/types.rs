/// Map sizing passed to [`Env::set_geometry`](crate::Env::set_geometry).
///
/// A negative bound or step keeps the engine's current value. `size_upper`
/// and `page_size` must not be negative; zero selects the engine default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Lower bound of the map size
    pub size_lower: isize,
    /// Size to use right now
    pub size_now: isize,
    /// Upper bound of the map size
    pub size_upper: isize,
    /// Growth step
    pub growth_step: isize,
    /// Shrink threshold
    pub shrink_threshold: isize,
    /// Page size, a power of two
    pub page_size: isize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            size_lower: -1,
            size_now: -1,
            size_upper: 0,
            growth_step: -1,
            shrink_threshold: -1,
            page_size: 0,
        }
    }
}
