//! Control Flow Helpers
//!
//! Jump targets for `break`/`continue` and the code ranges protected by
//! `try` blocks. Both record how many `finally` blocks were active when they
//! were opened, so a jump knows which `finally` bodies it has to run first.

use grove_classfile::Label;

/// Manages loop and switch context for break/continue statements
#[derive(Debug, Default)]
pub struct LoopStack {
    targets: Vec<JumpTarget>,
}

#[derive(Debug, Clone, Copy)]
struct JumpTarget {
    break_label: Label,
    /// `None` for `switch`, which only takes `break`
    continue_label: Option<Label>,
    finally_depth: usize,
}

impl LoopStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, break_label: Label, continue_label: Option<Label>, finally_depth: usize) {
        self.targets.push(JumpTarget {
            break_label,
            continue_label,
            finally_depth,
        });
    }

    pub fn pop(&mut self) {
        self.targets.pop();
    }

    /// Innermost `break` target and its `finally` depth
    pub fn break_target(&self) -> Option<(Label, usize)> {
        self.targets
            .last()
            .map(|t| (t.break_label, t.finally_depth))
    }

    /// Innermost loop's `continue` target, looking through switches
    pub fn continue_target(&self) -> Option<(Label, usize)> {
        self.targets
            .iter()
            .rev()
            .find_map(|t| t.continue_label.map(|label| (label, t.finally_depth)))
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Code covered by the handlers of one `try` block
///
/// Inlined `finally` code is cut out of the range, so a region is a list of
/// half-open `[start, end)` intervals.
#[derive(Debug, Clone)]
pub struct TryRegion {
    /// `finally` blocks active outside this region
    pub finally_depth: usize,
    ranges: Vec<(usize, usize)>,
    open: Option<usize>,
}

impl TryRegion {
    pub fn open(finally_depth: usize, at: usize) -> Self {
        Self {
            finally_depth,
            ranges: Vec::new(),
            open: Some(at),
        }
    }

    /// Stop covering code from `at` on
    pub fn pause(&mut self, at: usize) -> bool {
        match self.open.take() {
            Some(start) => {
                if at > start {
                    self.ranges.push((start, at));
                }
                true
            }
            None => false,
        }
    }

    pub fn resume(&mut self, at: usize) {
        if self.open.is_none() {
            self.open = Some(at);
        }
    }

    pub fn close(mut self, at: usize) -> Vec<(usize, usize)> {
        self.pause(at);
        self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_skips_switch() {
        let mut loops = LoopStack::new();
        assert!(loops.break_target().is_none());
        loops.push(Label(0), Some(Label(1)), 0);
        loops.push(Label(2), None, 1);
        assert_eq!(loops.break_target(), Some((Label(2), 1)));
        assert_eq!(loops.continue_target(), Some((Label(1), 0)));
        loops.pop();
        assert_eq!(loops.break_target(), Some((Label(0), 0)));
        loops.pop();
        assert!(loops.is_empty());
    }

    #[test]
    fn test_region_drops_empty_ranges() {
        let mut region = TryRegion::open(0, 4);
        assert!(region.pause(10));
        assert!(!region.pause(12));
        region.resume(15);
        region.pause(15);
        region.resume(20);
        assert_eq!(region.close(25), vec![(4, 10), (20, 25)]);
    }
}
