/// Selected row of a list whose length can change under it.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScrollState {
    pub selected_idx: Option<usize>,
}

impl ScrollState {
    pub fn new() -> Self {
        Self { selected_idx: None }
    }

    pub fn clamp_selection(&mut self, len: usize) {
        if len == 0 {
            self.selected_idx = None;
            return;
        }
        match self.selected_idx {
            Some(i) if i >= len => self.selected_idx = Some(len - 1),
            Some(_) => {}
            None => self.selected_idx = Some(0),
        }
    }

    pub fn move_up_wrap(&mut self, len: usize) {
        if len == 0 {
            self.selected_idx = None;
            return;
        }
        let cur = self.selected_idx.unwrap_or(0);
        self.selected_idx = Some(if cur == 0 { len - 1 } else { cur - 1 });
    }

    pub fn move_down_wrap(&mut self, len: usize) {
        if len == 0 {
            self.selected_idx = None;
            return;
        }
        let cur = self.selected_idx.unwrap_or(0);
        self.selected_idx = Some(if cur + 1 >= len { 0 } else { cur + 1 });
    }
}
