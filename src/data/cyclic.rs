// ============================================================
// Layer 4 — Cyclic Batch Source
// ============================================================
// The training loop draws ONE validation batch per epoch. When
// the validation loader runs dry the iterator is recreated and
// the first batch of the new pass is drawn, so a loader with M
// batches keeps serving epoch M + 1 and beyond.
//
// Exhaustion is not an error. Only a loader that yields nothing
// even after a restart returns None.

/// Endless iteration over a restartable batch source.
pub struct Cyclic<F, I>
where
    F: FnMut() -> I,
    I: Iterator,
{
    restart:  F,
    current:  I,
    restarts: usize,
}

impl<F, I> Cyclic<F, I>
where
    F: FnMut() -> I,
    I: Iterator,
{
    pub fn new(mut restart: F) -> Self {
        let current = restart();
        Self { restart, current, restarts: 0 }
    }

    pub fn next_batch(&mut self) -> Option<I::Item> {
        if let Some(item) = self.current.next() {
            return Some(item);
        }
        self.current   = (self.restart)();
        self.restarts += 1;
        tracing::debug!("Validation iterator exhausted, restart #{}", self.restarts);
        self.current.next()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restarts_after_exhaustion() {
        let batches = vec![10, 20, 30];
        let mut cyc = Cyclic::new(|| batches.clone().into_iter());

        let drawn: Vec<i32> = (0..7).map(|_| cyc.next_batch().unwrap()).collect();
        assert_eq!(drawn, vec![10, 20, 30, 10, 20, 30, 10]);
        assert_eq!(cyc.restarts, 2);
    }

    #[test]
    fn test_epoch_after_last_batch_redraws_first() {
        // M = 2 batches: epoch 3 gets the first batch of a fresh pass
        let mut cyc = Cyclic::new(|| vec!["a", "b"].into_iter());
        assert_eq!(cyc.next_batch(), Some("a"));
        assert_eq!(cyc.next_batch(), Some("b"));
        assert_eq!(cyc.next_batch(), Some("a"));
    }

    #[test]
    fn test_empty_source_yields_none() {
        let mut cyc = Cyclic::new(|| Vec::<u8>::new().into_iter());
        assert_eq!(cyc.next_batch(), None);
    }
}
