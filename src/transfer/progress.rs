/// Partial-progress snapshot of a transfer: fragments handled out of the
/// total.
///
/// # Examples
///
/// ```
/// use tandem::transfer::Progress;
/// let progress = Progress::new(3, 4);
/// assert_eq!(progress.percent(), 75);
/// assert!(!progress.is_complete());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    done: u32,
    total: u32,
}

impl Progress {
    /// Create a snapshot.
    #[must_use]
    pub const fn new(done: u32, total: u32) -> Self { Self { done, total } }

    /// Fragments sent or received so far.
    #[must_use]
    pub const fn done(self) -> u32 { self.done }

    /// Fragments in the transfer.
    #[must_use]
    pub const fn total(self) -> u32 { self.total }

    /// Whether every fragment has been handled.
    #[must_use]
    pub const fn is_complete(self) -> bool { self.done >= self.total }

    /// Completion as a whole percentage, rounded down.
    #[must_use]
    pub fn percent(self) -> u8 {
        if self.total == 0 || self.is_complete() {
            return 100;
        }
        let scaled = u64::from(self.done) * 100 / u64::from(self.total);
        u8::try_from(scaled).unwrap_or(100)
    }
}
