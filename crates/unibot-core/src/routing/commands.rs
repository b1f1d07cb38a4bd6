use std::{collections::HashMap, sync::Arc};

use crate::{errors::Error, handler::Handler, Result};

pub const COMMAND_MARKER: char = '/';

/// Lowercase and make sure the word starts with the command marker.
pub fn normalize_command(word: &str) -> String {
    let word = word.trim().to_lowercase();
    if word.is_empty() || word.starts_with(COMMAND_MARKER) {
        word
    } else {
        format!("{COMMAND_MARKER}{word}")
    }
}

/// Split `text` into a normalized command word and the trimmed remainder.
///
/// Blank input yields two empty strings.
pub fn parse_command(text: &str) -> (String, String) {
    let text = text.trim();
    let Some(first) = text.split_whitespace().next() else {
        return (String::new(), String::new());
    };
    let args = text[first.len()..].trim();
    (normalize_command(first), args.to_string())
}

pub fn is_command_shaped(text: &str) -> bool {
    text.trim().starts_with(COMMAND_MARKER)
}

/// Command word -> handler, plus the handler for everything else.
pub struct CommandTable {
    routes: HashMap<String, Arc<dyn Handler>>,
    fallback: Arc<dyn Handler>,
}

impl CommandTable {
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder::default()
    }

    pub fn get(&self, command: &str) -> Option<&Arc<dyn Handler>> {
        self.routes.get(command)
    }

    pub fn fallback(&self) -> &Arc<dyn Handler> {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Default)]
pub struct CommandTableBuilder {
    routes: HashMap<String, Arc<dyn Handler>>,
    fallback: Option<Arc<dyn Handler>>,
}

impl CommandTableBuilder {
    /// Later registrations of the same command replace earlier ones.
    pub fn route(mut self, command: &str, handler: Arc<dyn Handler>) -> Self {
        self.routes.insert(normalize_command(command), handler);
        self
    }

    pub fn fallback(mut self, handler: Arc<dyn Handler>) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn build(self) -> Result<CommandTable> {
        if let Some(empty) = self.routes.keys().find(|k| k.len() <= 1) {
            return Err(Error::Routing(format!("invalid command word {empty:?}")));
        }
        let fallback = self
            .fallback
            .ok_or_else(|| Error::Routing("command table needs a fallback handler".to_string()))?;
        Ok(CommandTable {
            routes: self.routes,
            fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Named;

    #[test]
    fn parse_normalizes_first_token() {
        assert_eq!(
            parse_command("  /Register  now please "),
            ("/register".to_string(), "now please".to_string())
        );
        assert_eq!(
            parse_command("HELP"),
            ("/help".to_string(), String::new())
        );
        assert_eq!(parse_command("   "), (String::new(), String::new()));
    }

    #[test]
    fn parse_keeps_inner_spacing_of_args() {
        let (cmd, args) = parse_command("/contact Wifi:  it is  down");
        assert_eq!(cmd, "/contact");
        assert_eq!(args, "Wifi:  it is  down");
    }

    #[test]
    fn command_shape_ignores_leading_space() {
        assert!(is_command_shaped("  /menu"));
        assert!(!is_command_shaped("menu"));
        assert!(!is_command_shaped(""));
    }

    #[test]
    fn build_requires_fallback() {
        let err = CommandTable::builder()
            .route("/start", Named::arc("start"))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Routing(_)));
    }

    #[test]
    fn last_registration_wins() {
        let second = Named::arc("second");
        let table = CommandTable::builder()
            .route("start", Named::arc("first"))
            .route("/START", second.clone())
            .fallback(Named::arc("fallback"))
            .build()
            .unwrap();
        assert_eq!(table.len(), 1);
        assert!(Arc::ptr_eq(table.get("/start").unwrap(), &second));
    }
}
