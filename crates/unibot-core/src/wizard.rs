//! Generic multi-turn input flow.
//!
//! A wizard is an ordered list of steps. Each step stores one value in the
//! conversation data bag under its `key` and is active while the state's step
//! tag equals its `tag` and the key is still missing. Several steps may share
//! one tag (the reminder builder does); the first missing key then decides
//! where the user is.

use chrono::{DateTime, Utc};

use crate::{messaging::Outbound, state::ConversationState};

/// What the user supplied for the current step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Text { text: &'a str, file: Option<&'a str> },
    /// Button choice, already stripped of the feature prefix.
    Choice(&'a str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accepts {
    Text,
    Choice,
    Either,
}

/// Validation failure; the message is shown and the step stays put.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejected(pub String);

impl Rejected {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type Validator = Box<
    dyn Fn(&Input<'_>, &ConversationState, DateTime<Utc>) -> Result<String, Rejected>
        + Send
        + Sync,
>;

pub type Prompt = Box<dyn Fn(&ConversationState, DateTime<Utc>) -> Outbound + Send + Sync>;

pub struct Step {
    pub tag: &'static str,
    pub key: &'static str,
    accepts: Accepts,
    validate: Validator,
    prompt: Prompt,
}

impl Step {
    pub fn new(
        tag: &'static str,
        key: &'static str,
        accepts: Accepts,
        validate: Validator,
        prompt: Prompt,
    ) -> Self {
        Self {
            tag,
            key,
            accepts,
            validate,
            prompt,
        }
    }

    /// Any non-blank text, trimmed.
    pub fn text(tag: &'static str, key: &'static str, prompt: Prompt) -> Self {
        Self::new(tag, key, Accepts::Text, Box::new(non_blank), prompt)
    }

    fn takes(&self, input: &Input<'_>) -> bool {
        matches!(
            (self.accepts, input),
            (Accepts::Text | Accepts::Either, Input::Text { .. })
                | (Accepts::Choice | Accepts::Either, Input::Choice(_))
        )
    }
}

pub fn non_blank(
    input: &Input<'_>,
    _: &ConversationState,
    _: DateTime<Utc>,
) -> Result<String, Rejected> {
    let value = match input {
        Input::Text { text, .. } => text.trim(),
        Input::Choice(c) => c.trim(),
    };
    if value.is_empty() {
        Err(Rejected::new("Please send some text."))
    } else {
        Ok(value.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Value stored; the next step is current.
    Advanced,
    /// Value stored for the last step. The owner performs its final action
    /// and then calls `finish`.
    Ready,
    Rejected(String),
    /// Wrong kind of input for this step (text where a button is expected).
    Ignored,
    WentBack,
    Cancelled,
}

pub struct Wizard {
    name: &'static str,
    steps: Vec<Step>,
    /// Step tag left behind by `finish`.
    terminal: &'static str,
    keep_data: bool,
}

impl Wizard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
            terminal: "",
            keep_data: false,
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Finish onto `tag` and keep the collected data (registration does).
    pub fn finish_onto(mut self, tag: &'static str) -> Self {
        self.terminal = tag;
        self.keep_data = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn owns(&self, state: &ConversationState) -> bool {
        self.steps.iter().any(|s| s.tag == state.step)
    }

    /// Index and step the user is on, if this wizard owns the state.
    pub fn current(&self, state: &ConversationState) -> Option<(usize, &Step)> {
        let mut owned = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.tag == state.step)
            .peekable();
        let first = *owned.peek()?;
        Some(
            owned
                .find(|(_, s)| !state.data.contains_key(s.key))
                .unwrap_or(first),
        )
    }

    /// Enter the first step with an empty bag.
    ///
    /// `context` pairs are kept in the bag for the whole flow (the ticket id a
    /// reply belongs to, for instance).
    pub fn start(&self, state: &mut ConversationState, context: &[(&str, &str)]) {
        state.reset();
        for (k, v) in context {
            state.set(k, *v);
        }
        if let Some(first) = self.steps.first() {
            state.enter(first.tag);
        }
    }

    pub fn apply(
        &self,
        state: &mut ConversationState,
        input: Input<'_>,
        now: DateTime<Utc>,
    ) -> Outcome {
        let Some((idx, step)) = self.current(state) else {
            return Outcome::Ignored;
        };
        if !step.takes(&input) {
            return Outcome::Ignored;
        }

        let value = match (step.validate)(&input, state, now) {
            Ok(v) => v,
            Err(Rejected(msg)) => return Outcome::Rejected(msg),
        };
        state.set(step.key, value);

        match self.steps.get(idx + 1) {
            Some(next) => {
                state.enter(next.tag);
                Outcome::Advanced
            }
            None => Outcome::Ready,
        }
    }

    /// Step back once. The target step's value is discarded so it can be
    /// collected again; earlier values stay.
    pub fn back(&self, state: &mut ConversationState) -> Outcome {
        let Some((idx, _)) = self.current(state) else {
            return Outcome::Ignored;
        };
        let Some(target) = idx.checked_sub(1).and_then(|i| self.steps.get(i)) else {
            return Outcome::Ignored;
        };
        state.data.remove(target.key);
        state.enter(target.tag);
        Outcome::WentBack
    }

    pub fn cancel(&self, state: &mut ConversationState) -> Outcome {
        state.reset();
        Outcome::Cancelled
    }

    pub fn finish(&self, state: &mut ConversationState) {
        if !self.keep_data {
            state.reset();
        }
        state.enter(self.terminal);
    }

    /// Prompt for wherever the user is now.
    pub fn prompt(&self, state: &ConversationState, now: DateTime<Utc>) -> Option<Outbound> {
        self.current(state).map(|(_, s)| (s.prompt)(state, now))
    }
}
