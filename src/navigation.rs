use tracing::info;

pub const DISCARD_PROMPT: &str = "Your form has unsaved changes. Leave this page anyway?";

/// Blocking yes/no dialog.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// App-wide UI flags. Owned by the app and reset on every page navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationState {
    pub is_redirecting: bool,
    pub has_unsaved_form: bool,
}

impl NavigationState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed(String),
    Cancelled,
}

#[derive(Debug, Default)]
pub struct Navigator {
    state: NavigationState,
    current: String,
}

impl Navigator {
    pub fn new(current: impl Into<String>) -> Self {
        Self {
            state: NavigationState::default(),
            current: current.into(),
        }
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn set_unsaved_form(&mut self, dirty: bool) {
        self.state.has_unsaved_form = dirty;
    }

    fn guard<C: Confirm + ?Sized>(&self, confirm: &C) -> bool {
        !self.state.has_unsaved_form || confirm.confirm(DISCARD_PROMPT)
    }

    /// Starts a navigation to `target`. Call [`Navigator::finish`] when the page is shown.
    pub fn push<C: Confirm + ?Sized>(
        &mut self,
        target: impl Into<String>,
        confirm: &C,
    ) -> Navigation {
        let target = target.into();
        if !self.guard(confirm) {
            info!("Navigation to {} cancelled", target);
            return Navigation::Cancelled;
        }
        self.state.is_redirecting = true;
        Navigation::Proceed(target)
    }

    /// History back/forward. A cancelled pop keeps the current location.
    pub fn pop<C: Confirm + ?Sized>(
        &mut self,
        target: impl Into<String>,
        confirm: &C,
    ) -> Navigation {
        match self.push(target, confirm) {
            Navigation::Cancelled => Navigation::Cancelled,
            proceed => {
                self.state.is_redirecting = false;
                proceed
            }
        }
    }

    /// Completes a navigation; this is the reset point for per-page flags.
    pub fn finish(&mut self, location: impl Into<String>) {
        self.current = location.into();
        self.state.reset();
    }
}
