use std::num::NonZeroUsize;
use std::ops::Range;

/// Fixed-size partition of an identifier list.
#[derive(Debug, Clone, Copy)]
pub struct BatchPlan {
    len: usize,
    size: NonZeroUsize,
}

/// A contiguous slice of the identifier list, processed and persisted as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 0-based position in the plan.
    pub index: usize,
    pub range: Range<usize>,
}

impl Batch {
    /// 1-based number used in file names and operator messages.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// First batch a run processes; every earlier batch is assumed complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResumePoint(usize);

impl ResumePoint {
    pub fn start() -> Self {
        ResumePoint(0)
    }

    /// From the 1-based number an operator reads off `batch_<n>.csv`.
    pub fn from_batch_number(number: usize) -> Option<Self> {
        number.checked_sub(1).map(ResumePoint)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl BatchPlan {
    pub fn new(len: usize, size: NonZeroUsize) -> Self {
        BatchPlan { len, size }
    }

    /// `ceil(len / size)`.
    pub fn count(&self) -> usize {
        self.len.div_ceil(self.size.get())
    }

    pub fn batch(&self, index: usize) -> Option<Batch> {
        if index >= self.count() {
            return None;
        }
        let start = index * self.size.get();
        let end = (start + self.size.get()).min(self.len);
        Some(Batch {
            index,
            range: start..end,
        })
    }

    /// Batches from `resume` to the end, in order.
    pub fn from(&self, resume: ResumePoint) -> impl Iterator<Item = Batch> + '_ {
        (resume.index()..self.count()).filter_map(move |i| self.batch(i))
    }
}

/// `<prefix><n>.csv`; a pure function of the batch number.
pub fn batch_file_name(prefix: &str, number: usize) -> String {
    format!("{prefix}{number}.csv")
}
