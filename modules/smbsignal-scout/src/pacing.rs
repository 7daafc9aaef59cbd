// Politeness delays for outbound calls. All network phases run strictly
// sequentially with these pauses in between.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct Pacing {
    /// A random delay in `search_delay_min..=search_delay_max` follows every search.
    pub search_delay_min: Duration,
    pub search_delay_max: Duration,
    pub page_fetch_delay: Duration,
    /// Consecutive empty searches before assuming the backend is blocking us.
    pub zero_result_streak: usize,
    pub zero_result_pause: Duration,
    pub probe_delay: Duration,
    pub registry_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            search_delay_min: Duration::from_secs(2),
            search_delay_max: Duration::from_secs(5),
            page_fetch_delay: Duration::from_secs(1),
            zero_result_streak: 20,
            zero_result_pause: Duration::from_secs(60),
            probe_delay: Duration::from_millis(500),
            registry_delay: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    /// No delays at all, for tests and dry runs. The zero-result streak
    /// threshold is kept so streak handling still triggers.
    pub fn none() -> Self {
        Self {
            search_delay_min: Duration::ZERO,
            search_delay_max: Duration::ZERO,
            page_fetch_delay: Duration::ZERO,
            zero_result_streak: 20,
            zero_result_pause: Duration::ZERO,
            probe_delay: Duration::ZERO,
            registry_delay: Duration::ZERO,
        }
    }

    pub fn search_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.search_delay_max <= self.search_delay_min {
            return self.search_delay_min;
        }
        rng.random_range(self.search_delay_min..=self.search_delay_max)
    }
}

pub(crate) async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn search_delay_stays_in_range() {
        let pacing = Pacing::default();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let d = pacing.search_delay(&mut rng);
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(5));
        }
    }

    #[test]
    fn no_pacing_means_no_delay() {
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(Pacing::none().search_delay(&mut rng), Duration::ZERO);
    }
}
