//! Range bounds with hysteresis.
//!
//! Outer boundaries (`low`, `high`) detect a signal leaving the band. Inner
//! boundaries sit inside the band by the hysteresis gaps and detect the
//! signal coming back, so a noisy reading hovering at an outer boundary does
//! not flip the state on every sample.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundaryError {
    #[error("Boundary value is not a finite number: {0}")]
    NotFinite(f64),

    #[error(
        "Invalid boundaries: expected low {low} <= low inner {low_inner} < high inner {high_inner} <= high {high}"
    )]
    OutOfOrder {
        low: f64,
        low_inner: f64,
        high_inner: f64,
        high: f64,
    },
}

/// A validated set of four thresholds.
///
/// Every constructor and `with_*` update checks
/// `low <= low_inner < high_inner <= high` and returns a new value, so a
/// rejected update never leaves a half-applied configuration behind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundaries {
    low: f64,
    low_inner: f64,
    high_inner: f64,
    high: f64,
}

impl Boundaries {
    /// `low_hysteresis` is added to `low`, `high_hysteresis` subtracted from `high`.
    pub fn new(
        low: f64,
        high: f64,
        low_hysteresis: f64,
        high_hysteresis: f64,
    ) -> Result<Self, BoundaryError> {
        Self::validated(low, low + low_hysteresis, high - high_hysteresis, high)
    }

    fn validated(
        low: f64,
        low_inner: f64,
        high_inner: f64,
        high: f64,
    ) -> Result<Self, BoundaryError> {
        for value in [low, low_inner, high_inner, high] {
            if !value.is_finite() {
                return Err(BoundaryError::NotFinite(value));
            }
        }
        if low > low_inner || low_inner >= high_inner || high_inner > high {
            return Err(BoundaryError::OutOfOrder {
                low,
                low_inner,
                high_inner,
                high,
            });
        }
        Ok(Self {
            low,
            low_inner,
            high_inner,
            high,
        })
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low_inner(&self) -> f64 {
        self.low_inner
    }

    pub fn high_inner(&self) -> f64 {
        self.high_inner
    }

    pub fn low_hysteresis(&self) -> f64 {
        self.low_inner - self.low
    }

    pub fn high_hysteresis(&self) -> f64 {
        self.high - self.high_inner
    }

    /// Moves the lower outer boundary, keeping the current lower gap.
    pub fn with_low(&self, low: f64) -> Result<Self, BoundaryError> {
        Self::validated(low, low + self.low_hysteresis(), self.high_inner, self.high)
    }

    /// Moves the upper outer boundary, keeping the current upper gap.
    pub fn with_high(&self, high: f64) -> Result<Self, BoundaryError> {
        Self::validated(self.low, self.low_inner, high - self.high_hysteresis(), high)
    }

    pub fn with_low_hysteresis(&self, gap: f64) -> Result<Self, BoundaryError> {
        Self::validated(self.low, self.low + gap, self.high_inner, self.high)
    }

    pub fn with_high_hysteresis(&self, gap: f64) -> Result<Self, BoundaryError> {
        Self::validated(self.low, self.low_inner, self.high - gap, self.high)
    }
}

/// Direction of a boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    None,
    ExitUp,
    ExitDown,
    Enter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Inside,
    Below,
    Above,
}

#[derive(Debug, Clone)]
pub struct RangeDetector {
    bounds: Boundaries,
    position: Position,
}

impl RangeDetector {
    pub fn new(bounds: Boundaries) -> Self {
        Self {
            bounds,
            position: Position::Inside,
        }
    }

    pub fn boundaries(&self) -> Boundaries {
        self.bounds
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Replaces the boundaries with the result of `update`. On error the
    /// detector keeps its previous boundaries.
    pub fn update<F>(&mut self, update: F) -> Result<Boundaries, BoundaryError>
    where
        F: FnOnce(&Boundaries) -> Result<Boundaries, BoundaryError>,
    {
        let bounds = update(&self.bounds)?;
        self.bounds = bounds;
        Ok(bounds)
    }

    pub fn set_low(&mut self, low: f64) -> Result<Boundaries, BoundaryError> {
        self.update(|b| b.with_low(low))
    }

    pub fn set_high(&mut self, high: f64) -> Result<Boundaries, BoundaryError> {
        self.update(|b| b.with_high(high))
    }

    pub fn set_low_hysteresis(&mut self, gap: f64) -> Result<Boundaries, BoundaryError> {
        self.update(|b| b.with_low_hysteresis(gap))
    }

    pub fn set_high_hysteresis(&mut self, gap: f64) -> Result<Boundaries, BoundaryError> {
        self.update(|b| b.with_high_hysteresis(gap))
    }

    /// Examines one reading and returns the crossing it causes, if any.
    ///
    /// The checks form an ordered chain: the first matching branch wins and
    /// at most one event is produced per reading.
    pub fn feed(&mut self, value: f64) -> Cross {
        let b = &self.bounds;
        let (cross, position) = if self.position != Position::Above && value > b.high {
            (Cross::ExitUp, Position::Above)
        } else if self.position == Position::Above && value < b.high_inner {
            if value < b.low {
                (Cross::ExitDown, Position::Below)
            } else {
                (Cross::Enter, Position::Inside)
            }
        } else if self.position != Position::Below && value < b.low {
            (Cross::ExitDown, Position::Below)
        } else if self.position == Position::Below && value > b.low_inner {
            if value > b.high {
                (Cross::ExitUp, Position::Above)
            } else {
                (Cross::Enter, Position::Inside)
            }
        } else {
            (Cross::None, self.position)
        };

        self.position = position;
        cross
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> RangeDetector {
        RangeDetector::new(Boundaries::new(20.0, 80.0, 3.0, 5.0).unwrap())
    }

    #[test]
    fn inner_boundaries_follow_gaps() {
        let b = Boundaries::new(20.0, 80.0, 3.0, 5.0).unwrap();
        assert_eq!(b.low_inner(), 23.0);
        assert_eq!(b.high_inner(), 75.0);
        assert_eq!(b.low_hysteresis(), 3.0);
        assert_eq!(b.high_hysteresis(), 5.0);
    }

    #[test]
    fn feeds_ordered_crossings() {
        let mut d = detector();
        let events: Vec<Cross> = [10.0, 30.0, 85.0, 70.0, 90.0, 15.0]
            .into_iter()
            .map(|v| d.feed(v))
            .collect();
        assert_eq!(
            events,
            vec![
                Cross::ExitDown,
                Cross::Enter,
                Cross::ExitUp,
                Cross::Enter,
                Cross::ExitUp,
                Cross::ExitDown,
            ]
        );
        assert_eq!(d.position(), Position::Below);
    }

    #[test]
    fn hysteresis_suppresses_chatter() {
        let mut d = detector();
        assert_eq!(d.feed(81.0), Cross::ExitUp);
        // Between high inner and high outer: still above, no event.
        assert_eq!(d.feed(79.0), Cross::None);
        assert_eq!(d.feed(81.0), Cross::None);
        assert_eq!(d.feed(76.0), Cross::None);
        assert_eq!(d.feed(74.0), Cross::Enter);

        assert_eq!(d.feed(19.0), Cross::ExitDown);
        assert_eq!(d.feed(22.0), Cross::None);
        assert_eq!(d.feed(18.0), Cross::None);
        assert_eq!(d.feed(24.0), Cross::Enter);
    }

    #[test]
    fn jumps_straight_across_the_band() {
        let mut d = detector();
        assert_eq!(d.feed(10.0), Cross::ExitDown);
        assert_eq!(d.feed(95.0), Cross::ExitUp);
        assert_eq!(d.position(), Position::Above);
        assert_eq!(d.feed(5.0), Cross::ExitDown);
        assert_eq!(d.position(), Position::Below);
    }

    #[test]
    fn readings_on_boundaries_do_not_cross() {
        let mut d = detector();
        assert_eq!(d.feed(80.0), Cross::None);
        assert_eq!(d.feed(20.0), Cross::None);
        assert_eq!(d.position(), Position::Inside);
    }

    #[test]
    fn rejects_out_of_order_boundaries() {
        assert!(matches!(
            Boundaries::new(80.0, 20.0, 0.0, 0.0),
            Err(BoundaryError::OutOfOrder { .. })
        ));
        // Inner boundaries meet.
        assert!(Boundaries::new(20.0, 30.0, 5.0, 5.0).is_err());
        // Negative gap pushes an inner boundary outside.
        assert!(Boundaries::new(20.0, 80.0, -1.0, 5.0).is_err());
        assert!(matches!(
            Boundaries::new(f64::NAN, 80.0, 3.0, 5.0),
            Err(BoundaryError::NotFinite(_))
        ));
        // Zero gaps are allowed.
        assert!(Boundaries::new(20.0, 80.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn failed_update_keeps_previous_boundaries() {
        let mut d = detector();
        let before = d.boundaries();

        assert!(d.set_low(78.0).is_err());
        assert!(d.set_high(21.0).is_err());
        assert!(d.set_low_hysteresis(60.0).is_err());
        assert!(d.set_high_hysteresis(f64::INFINITY).is_err());
        assert_eq!(d.boundaries(), before);
    }

    #[test]
    fn moving_outer_boundary_keeps_gap() {
        let mut d = detector();
        let b = d.set_low(10.0).unwrap();
        assert_eq!(b.low(), 10.0);
        assert_eq!(b.low_inner(), 13.0);

        let b = d.set_high(90.0).unwrap();
        assert_eq!(b.high_inner(), 85.0);

        let b = d.set_high_hysteresis(10.0).unwrap();
        assert_eq!(b.high_inner(), 80.0);
        assert_eq!(d.boundaries(), b);

        let b = d.boundaries();
        assert!(b.low() <= b.low_inner());
        assert!(b.low_inner() < b.high_inner());
        assert!(b.high_inner() <= b.high());
    }
}
