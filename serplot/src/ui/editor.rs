//! Single line editor for text sent to the device, with recall of earlier
//! lines.

static HISTORY_LEN: usize = 100;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineEditor {
    active: bool,
    text: String,
    history: Vec<String>,
    /// Index into `history` while recalling. `None` edits a new line.
    recall: Option<usize>,
}

impl LineEditor {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Sent lines, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn open(&mut self) {
        self.active = true;
    }

    /// Leaves the editor, dropping the line being edited.
    pub fn close(&mut self) {
        self.active = false;
        self.text.clear();
        self.recall = None;
    }

    pub fn push(&mut self, c: char) {
        self.text.push(c);
    }

    pub fn backspace(&mut self) {
        self.text.pop();
    }

    /// Takes the edited line and starts an empty one. Non-empty lines are
    /// remembered, skipping a repeat of the previous one.
    pub fn submit(&mut self) -> String {
        let line = std::mem::take(&mut self.text);
        self.recall = None;
        if !line.is_empty() && self.history.last() != Some(&line) {
            self.history.push(line.clone());
            if self.history.len() > HISTORY_LEN {
                self.history.remove(0);
            }
        }
        line
    }

    /// Replaces the line with the previous history entry. Returns whether
    /// anything changed.
    pub fn recall_prev(&mut self) -> bool {
        let i = match (self.recall, self.history.len()) {
            (_, 0) => return false,
            (None, n) => n - 1,
            (Some(0), _) => return false,
            (Some(i), _) => i - 1,
        };
        self.recall = Some(i);
        self.text = self.history[i].clone();
        true
    }

    /// Moves towards newer entries, ending on an empty line.
    pub fn recall_next(&mut self) -> bool {
        match self.recall {
            None => false,
            Some(i) if i + 1 < self.history.len() => {
                self.recall = Some(i + 1);
                self.text = self.history[i + 1].clone();
                true
            }
            Some(_) => {
                self.recall = None;
                self.text.clear();
                true
            }
        }
    }
}
