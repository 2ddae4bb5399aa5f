use crate::commands::handler::CommandHandler;
use crate::core::error::ChatError;
use std::collections::HashMap;
use std::sync::Arc;

pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<C: CommandHandler + 'static>(&mut self, names: &[&str], command: C) {
        let handler: Arc<dyn CommandHandler> = Arc::new(command);
        for name in names {
            self.handlers.insert(name.to_string(), Arc::clone(&handler));
        }
    }

    pub fn execute(
        &self,
        name: &str,
        args: &[&str],
        state: &mut super::ChatState,
    ) -> Result<Option<String>, ChatError> {
        self.handlers
            .get(name)
            .ok_or_else(|| {
                ChatError::Input(format!("Unknown command: /{}. Type /help for a list.", name))
            })
            .and_then(|handler| handler.execute(state, args))
    }

    /// Sorted, for stable completion lists.
    pub fn get_command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}
