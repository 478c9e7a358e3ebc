use crossbeam_channel::{Receiver, Sender, bounded};

/// Single submission token shared by the frame source and whoever finishes
/// with a frame. Holding it is the only way to hand a frame to inference, so
/// at most one frame is in flight at a time.
#[derive(Clone, Debug)]
pub struct SubmissionCredit {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl SubmissionCredit {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.try_send(());
        Self { tx, rx }
    }

    pub fn try_acquire(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Returns the token. Releasing twice is harmless since the slot holds one.
    pub fn release(&self) {
        let _ = self.tx.try_send(());
    }
}

impl Default for SubmissionCredit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_holder_at_a_time() {
        let credit = SubmissionCredit::new();
        let other = credit.clone();
        assert!(credit.try_acquire());
        assert!(!other.try_acquire());

        other.release();
        other.release();
        assert!(credit.try_acquire());
        assert!(!credit.try_acquire());
    }
}
