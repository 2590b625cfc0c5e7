//! Output buffer and diagnostics of one (sequence, window) pair.
//!
//! Workers only record `Copy` notices into fixed slots; nothing is logged or
//! allocated for diagnostics inside a parallel region. [`RollAnswer::replay`]
//! reports them afterwards on the calling thread.

use std::fmt;

use log::{debug, warn};

use dtframe_types::{ColumnType, FrameError, Result};

/// Severity of the most serious notice recorded for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    Ok,
    Message,
    Warning,
    Error,
}

/// A diagnostic recorded while computing one answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Notice {
    /// The window is wider than the sequence; every position is fill.
    WindowExceedsInput { window: usize, len: usize },
    /// Some windows held non-finite values and were recomputed exactly.
    Rescanned,
    /// NA values were found although the caller asserted there are none.
    NaDespiteNoNa,
    /// A callback returned something other than one number.
    BadCallbackResult {
        window: usize,
        position: usize,
        len: usize,
        dtype: ColumnType,
    },
}

impl Notice {
    pub fn level(&self) -> Status {
        match self {
            Notice::WindowExceedsInput { .. } | Notice::Rescanned => Status::Message,
            Notice::NaDespiteNoNa => Status::Warning,
            Notice::BadCallbackResult { .. } => Status::Error,
        }
    }

    fn slot(&self) -> usize {
        match self.level() {
            Status::Ok | Status::Message => 0,
            Status::Warning => 1,
            Status::Error => 2,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::WindowExceedsInput { window, len } => write!(
                f,
                "window width {} is larger than the input length {}; all positions are filled",
                window, len
            ),
            Notice::Rescanned => write!(
                f,
                "non-finite values in the running total; affected windows were recomputed"
            ),
            Notice::NaDespiteNoNa => write!(
                f,
                "has_na = No used but NA value(s) are present in input; use the default has_na to avoid this warning"
            ),
            Notice::BadCallbackResult {
                window,
                position,
                len,
                dtype,
            } => write!(
                f,
                "callback for window width {} at position {} returned {} value(s) of type {}; \
                 it must return a single numeric or boolean value",
                window,
                position + 1,
                len,
                dtype
            ),
        }
    }
}

/// Output values plus status for one (sequence, window) pair.
#[derive(Debug, Clone)]
pub struct RollAnswer {
    pub values: Vec<f64>,
    status: Status,
    // message, warning, error, spare
    notices: [Option<Notice>; 4],
}

impl RollAnswer {
    pub fn new(len: usize) -> Self {
        RollAnswer {
            values: vec![f64::NAN; len],
            status: Status::Ok,
            notices: [None; 4],
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Record `notice`; the first notice of each severity is kept, a second
    /// distinct one goes to the spare slot if it is free.
    pub fn note(&mut self, notice: Notice) {
        self.status = self.status.max(notice.level());
        let slot = notice.slot();
        match self.notices[slot] {
            None => self.notices[slot] = Some(notice),
            Some(existing) if existing == notice => {}
            Some(_) => {
                if self.notices[3].is_none() {
                    self.notices[3] = Some(notice);
                }
            }
        }
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter().flatten()
    }

    /// Log the recorded notices and collect warnings. The first error
    /// becomes `Err`. `label` identifies the pair in messages.
    pub fn replay(&self, label: &str, verbose: bool, warnings: &mut Vec<String>) -> Result<()> {
        let mut first_error = None;
        for notice in self.notices() {
            match notice.level() {
                Status::Ok | Status::Message => {
                    if verbose {
                        debug!("{}: {}", label, notice);
                    }
                }
                Status::Warning => {
                    let msg = format!("{}: {}", label, notice);
                    warn!("{}", msg);
                    warnings.push(msg);
                }
                Status::Error => {
                    if first_error.is_none() {
                        first_error = Some(*notice);
                    }
                }
            }
        }
        match first_error {
            Some(notice) => Err(FrameError::Callback(format!("{}: {}", label, notice))),
            None => Ok(()),
        }
    }
}
