//! Object boundary detection
//!
//! A small state machine that finds where a JSON object ends in a byte
//! stream without parsing it. Braces and quotes inside strings are inert,
//! and an escaped character never closes a string.

/// Scanner states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Inside an object, outside any string
    InObject,
    /// Inside a string literal
    InString,
    /// Right after a backslash inside a string
    InStringEscape,
}

/// Tracks object/string nesting for one object at a time.
///
/// The opening `{` has already been consumed when the machine starts.
#[derive(Debug)]
pub struct ObjectBoundary {
    state: ScanState,
    stack: Vec<ScanState>,
}

impl Default for ObjectBoundary {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectBoundary {
    pub fn new() -> Self {
        Self {
            state: ScanState::InObject,
            stack: Vec::new(),
        }
    }

    /// Start over at the top level of a fresh object
    pub fn reset(&mut self) {
        self.state = ScanState::InObject;
        self.stack.clear();
    }

    /// Current nesting depth below the top-level object
    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Feed one byte. Returns `true` once the top-level object is closed.
    pub fn step(&mut self, b: u8) -> bool {
        match self.state {
            ScanState::InObject => match b {
                b'}' => return self.pop(),
                b'{' => self.push(ScanState::InObject),
                b'"' => self.push(ScanState::InString),
                _ => {}
            },
            ScanState::InString => match b {
                b'\\' => self.state = ScanState::InStringEscape,
                b'"' => return self.pop(),
                _ => {}
            },
            ScanState::InStringEscape => self.state = ScanState::InString,
        }
        false
    }

    fn push(&mut self, next: ScanState) {
        self.stack.push(self.state);
        self.state = next;
    }

    /// Return to the enclosing state; `true` when there is none left.
    fn pop(&mut self) -> bool {
        match self.stack.pop() {
            Some(prev) => {
                self.state = prev;
                false
            }
            None => true,
        }
    }
}
