use std::sync::Arc;

use tracing::debug;

use crate::{
    handler::Handler,
    routing::{
        callbacks::CallbackTable,
        commands::{is_command_shaped, parse_command, CommandTable},
    },
    state::{steps, ConversationState},
};

/// A step that hands the user's next free-text message to one command's handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepRoute {
    pub step: &'static str,
    pub command: &'static str,
    /// Route even when the text is blank (file-only replies).
    pub fires_on_blank: bool,
}

/// Checked in this order. Earlier entries take priority.
pub const STEP_ROUTES: [StepRoute; 6] = [
    StepRoute {
        step: steps::TICKET_REPLY,
        command: "/tickets",
        fires_on_blank: false,
    },
    StepRoute {
        step: steps::TICKET_USER_REPLY,
        command: "/mytickets",
        fires_on_blank: false,
    },
    StepRoute {
        step: steps::DOC_RESPONSE,
        command: "/documents",
        fires_on_blank: true,
    },
    StepRoute {
        step: steps::SEND_NEWS,
        command: "/send_news",
        fires_on_blank: false,
    },
    StepRoute {
        step: steps::MOODLE_TOKEN,
        command: "/moodle",
        fires_on_blank: false,
    },
    StepRoute {
        step: steps::REMINDER_CREATE,
        command: "/reminder",
        fires_on_blank: false,
    },
];

/// Owner of every other non-idle step.
pub const WIZARD_FALLBACK_COMMAND: &str = "/register";

pub struct RouteDecision {
    pub handler: Arc<dyn Handler>,
    pub command: String,
    pub args: String,
}

pub struct Router {
    commands: CommandTable,
    callbacks: CallbackTable,
    step_routes: Vec<StepRoute>,
}

impl Router {
    pub fn new(commands: CommandTable, callbacks: CallbackTable) -> Self {
        Self {
            commands,
            callbacks,
            step_routes: STEP_ROUTES.to_vec(),
        }
    }

    /// Plain command lookup; unknown or blank text goes to the fallback with
    /// the parsed command and args still attached.
    pub fn resolve(&self, text: &str) -> RouteDecision {
        let (command, args) = parse_command(text);
        let handler = self
            .commands
            .get(&command)
            .unwrap_or_else(|| self.commands.fallback());
        RouteDecision {
            handler: Arc::clone(handler),
            command,
            args,
        }
    }

    /// Resolve with the user's current step taken into account.
    ///
    /// Free text during a flow goes to the flow's owner with the raw text as
    /// `args` and an empty command. Command-shaped text always escapes.
    pub fn resolve_by_state(&self, text: &str, state: Option<&ConversationState>) -> RouteDecision {
        let Some(state) = state else {
            return self.resolve(text);
        };

        let command_shaped = is_command_shaped(text);
        let blank = text.trim().is_empty();

        for route in &self.step_routes {
            if state.step != route.step || command_shaped {
                continue;
            }
            if blank && !route.fires_on_blank {
                continue;
            }
            if let Some(decision) = self.step_owned(route.command, text) {
                return decision;
            }
        }

        let owned_elsewhere = self.step_routes.iter().any(|r| r.step == state.step);
        if !state.is_idle() && !owned_elsewhere && !command_shaped && !blank {
            if let Some(decision) = self.step_owned(WIZARD_FALLBACK_COMMAND, text) {
                return decision;
            }
        }

        self.resolve(text)
    }

    fn step_owned(&self, command: &str, text: &str) -> Option<RouteDecision> {
        let handler = self.commands.get(command)?;
        debug!(command, "step-owned input");
        Some(RouteDecision {
            handler: Arc::clone(handler),
            command: String::new(),
            args: text.to_string(),
        })
    }

    pub fn resolve_callback(&self, payload: &str) -> Option<Arc<dyn Handler>> {
        self.callbacks.resolve(payload)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::testing::Named;

    struct Fixture {
        router: Router,
        register: Arc<dyn Handler>,
        tickets: Arc<dyn Handler>,
        documents: Arc<dyn Handler>,
        moodle: Arc<dyn Handler>,
        fallback: Arc<dyn Handler>,
    }

    fn fixture() -> Fixture {
        let register = Named::arc("register");
        let tickets = Named::arc("tickets");
        let documents = Named::arc("documents");
        let moodle = Named::arc("moodle");
        let fallback = Named::arc("fallback");
        let commands = CommandTable::builder()
            .route("/register", register.clone())
            .route("/tickets", tickets.clone())
            .route("/mytickets", Named::arc("mytickets"))
            .route("/documents", documents.clone())
            .route("/moodle", moodle.clone())
            .route("/menu", Named::arc("menu"))
            .fallback(fallback.clone())
            .build()
            .unwrap();
        let callbacks = CallbackTable::builder()
            .route("doc:*", documents.clone())
            .build()
            .unwrap();
        Fixture {
            router: Router::new(commands, callbacks),
            register,
            tickets,
            documents,
            moodle,
            fallback,
        }
    }

    fn at(step: &str) -> ConversationState {
        let mut s = ConversationState::new(Utc::now());
        s.enter(step);
        s
    }

    #[test]
    fn idle_and_completed_resolve_like_plain_commands() {
        let f = fixture();
        for step in [steps::IDLE, steps::COMPLETED] {
            let state = at(step);
            for text in ["/menu", "/register", "/tickets x", "hello"] {
                let a = f.router.resolve_by_state(text, Some(&state));
                let b = f.router.resolve(text);
                assert!(Arc::ptr_eq(&a.handler, &b.handler), "{step:?} {text:?}");
                assert_eq!(a.command, b.command);
                assert_eq!(a.args, b.args);
            }
        }
    }

    #[test]
    fn ticket_reply_takes_raw_text() {
        let f = fixture();
        let d = f
            .router
            .resolve_by_state("  thanks, fixed it ", Some(&at(steps::TICKET_REPLY)));
        assert!(Arc::ptr_eq(&d.handler, &f.tickets));
        assert_eq!(d.command, "");
        assert_eq!(d.args, "  thanks, fixed it ");
    }

    #[test]
    fn commands_escape_step_ownership() {
        let f = fixture();
        let d = f
            .router
            .resolve_by_state("/menu", Some(&at(steps::TICKET_REPLY)));
        assert_eq!(d.command, "/menu");
        assert!(!Arc::ptr_eq(&d.handler, &f.tickets));
    }

    #[test]
    fn doc_response_fires_on_blank() {
        let f = fixture();
        let d = f.router.resolve_by_state("", Some(&at(steps::DOC_RESPONSE)));
        assert!(Arc::ptr_eq(&d.handler, &f.documents));
        assert_eq!(d.args, "");
    }

    #[test]
    fn blank_text_elsewhere_falls_through() {
        let f = fixture();
        let d = f.router.resolve_by_state("  ", Some(&at(steps::MOODLE_TOKEN)));
        assert!(Arc::ptr_eq(&d.handler, &f.fallback));
        let d = f.router.resolve_by_state("", Some(&at(steps::AGE)));
        assert!(Arc::ptr_eq(&d.handler, &f.fallback));
    }

    #[test]
    fn unowned_steps_go_to_registration() {
        let f = fixture();
        for step in [steps::FIRST_NAME, steps::AGE, "some_future_step"] {
            let d = f.router.resolve_by_state("Ann", Some(&at(step)));
            assert!(Arc::ptr_eq(&d.handler, &f.register), "{step}");
            assert_eq!(d.args, "Ann");
        }
    }

    #[test]
    fn missing_owner_falls_through_to_plain_resolve() {
        let f = fixture();
        // no /send_news handler registered
        let d = f.router.resolve_by_state("Breaking", Some(&at(steps::SEND_NEWS)));
        assert!(Arc::ptr_eq(&d.handler, &f.fallback));
        assert_eq!(d.command, "/breaking");
    }

    #[test]
    fn moodle_token_goes_to_moodle() {
        let f = fixture();
        let d = f.router.resolve_by_state("abc123", Some(&at(steps::MOODLE_TOKEN)));
        assert!(Arc::ptr_eq(&d.handler, &f.moodle));
    }

    #[test]
    fn callback_wildcard_resolves() {
        let f = fixture();
        let h = f.router.resolve_callback("doc:certificate").unwrap();
        assert!(Arc::ptr_eq(&h, &f.documents));
        assert!(f.router.resolve_callback("lib_manage:issue:1:2").is_none());
    }
}
