//! Chat command modules and their registry
//!
//! `CommandRegistry` specializes the module registry for chat commands:
//! registration indexes every alias, removal purges them, and the dispatch
//! path resolves a message's prefix, extracts the command name and
//! arguments, checks permissions, and executes the handler.

pub mod parse;
pub mod resolvers;

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::config::CommandConfig;
use crate::emitter::Emitter;
use crate::errors::{Error, Result};
use crate::loader::ModuleLoader;
use crate::message::{ClientInfo, Message};
use crate::module::{Module, ModuleEntry};
use crate::registry::{ModuleRegistry, Registry};
use crate::unique_map::UniqueMap;

pub use resolvers::{PermissionCheck, PermissionFn, PermissionFuture, PermissionSpec, Prefix, PrefixFn};

/// Event emitted when a command is blocked by a permission shortfall.
pub const MISSING_PERMISSIONS: &str = "missing_permissions";

/// Context handed to a command handler.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// The message that triggered the command.
    pub message: Message,
    /// The alias the user typed.
    pub alias: String,
    /// Positional arguments after the command name.
    pub args: Vec<String>,
}

/// A chat command module.
#[async_trait]
pub trait Command: Module {
    /// Tokens a user can type to invoke this command. Must be unique
    /// across the registry.
    fn aliases(&self) -> &[String];

    fn description(&self) -> Option<&str> {
        None
    }

    /// Per-command prefix override; the registry default applies when
    /// absent.
    fn prefix(&self) -> Option<&Prefix> {
        None
    }

    /// Permissions the bot itself needs before the command may run.
    fn bot_permissions(&self) -> Option<&PermissionSpec> {
        None
    }

    /// Permissions the invoking user needs.
    fn user_permissions(&self) -> Option<&PermissionSpec> {
        None
    }

    async fn exec(&self, _ctx: CommandContext) -> Result<()> {
        Err(Error::MethodNotImplemented {
            type_name: "Command",
            method: "exec",
        })
    }
}

/// Which party a permission shortfall was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionSide {
    Client,
    User,
}

impl PermissionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionSide::Client => "client",
            PermissionSide::User => "user",
        }
    }
}

/// Outcome of running a message through the dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A command handler ran to completion.
    Executed { id: String },
    /// A permission shortfall aborted dispatch. `missing` is `None` when
    /// the failing check was a computed predicate.
    Blocked {
        id: String,
        missing: Option<Vec<String>>,
        on: PermissionSide,
    },
    /// The message did not resolve to a command. Not an error.
    Ignored,
}

/// Commands sharing one prefix override, in registration order.
struct PrefixGroup {
    prefix: Prefix,
    ids: BTreeSet<String>,
}

#[derive(Deserialize)]
struct MessageUpdate {
    before: Message,
    after: Message,
}

/// Registry of chat command modules.
pub struct CommandRegistry {
    base: ModuleRegistry<dyn Command>,
    aliases: RwLock<UniqueMap<String>>,
    prefix_groups: RwLock<Vec<PrefixGroup>>,
    default_prefix: Prefix,
    client: ClientInfo,
    allow_mention: bool,
    handle_edits: bool,
    // Accepted as configuration; the dispatch path does not enforce it.
    #[allow(dead_code)]
    guild_only: bool,
}

impl CommandRegistry {
    pub fn new(
        loader: Arc<dyn ModuleLoader<dyn Command>>,
        config: CommandConfig,
        client: ClientInfo,
    ) -> Self {
        Self {
            base: ModuleRegistry::new(loader, config.registry),
            aliases: RwLock::new(UniqueMap::new()),
            prefix_groups: RwLock::new(Vec::new()),
            default_prefix: Prefix::Literal(config.prefix),
            client,
            allow_mention: config.allow_mention,
            handle_edits: config.handle_edits,
            guild_only: config.guild_only,
        }
    }

    /// Replace the default prefix with a list or computed resolver.
    pub fn with_default_prefix(mut self, prefix: Prefix) -> Self {
        self.default_prefix = prefix;
        self
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    /// Resolve an alias to the command registered under it.
    pub fn find_command(&self, alias: &str) -> Option<ModuleEntry<dyn Command>> {
        let id = self.aliases.read().ok()?.get(alias).cloned()?;
        self.base.get(&id)
    }

    fn index_prefix(&self, prefix: &Prefix, id: &str) -> Result<()> {
        let mut groups = self
            .prefix_groups
            .write()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
        if let Some(group) = groups.iter_mut().find(|g| g.prefix.same_resolver(prefix)) {
            group.ids.insert(id.to_string());
        } else {
            groups.push(PrefixGroup {
                prefix: prefix.clone(),
                ids: BTreeSet::from([id.to_string()]),
            });
        }
        Ok(())
    }

    fn unindex(&self, id: &str, aliases: &[String]) {
        if let Ok(mut map) = self.aliases.write() {
            for alias in aliases {
                map.remove(alias);
            }
        }
        if let Ok(mut groups) = self.prefix_groups.write() {
            for group in groups.iter_mut() {
                group.ids.remove(id);
            }
            groups.retain(|group| !group.ids.is_empty());
        }
    }

    fn notify_missing(
        &self,
        id: &str,
        message: &Message,
        missing: Option<&[String]>,
        on: PermissionSide,
    ) {
        warn!(command = %id, on = on.as_str(), "missing permissions");
        self.base.events().emit(
            MISSING_PERMISSIONS,
            &json!({
                "command": id,
                "channel": message.channel_id,
                "author": message.author_id,
                "missing": missing,
                "on": on.as_str(),
            }),
        );
    }

    /// Candidate prefixes from the registry-wide default (plus the bot
    /// mention when enabled).
    fn default_prefixes(&self, message: &Message) -> Vec<String> {
        let mut prefixes = self.default_prefix.resolve(message);
        if self.allow_mention {
            prefixes.push(self.client.mention());
        }
        prefixes
    }

    /// Fall back to the per-command prefix overrides, in registration
    /// order. A match restricts resolution to the commands sharing that
    /// prefix.
    fn parse_with_overrides(&self, content: &str, message: &Message) -> Option<(parse::Parsed, BTreeSet<String>)> {
        let groups: Vec<(Prefix, BTreeSet<String>)> = self
            .prefix_groups
            .read()
            .ok()?
            .iter()
            .map(|group| (group.prefix.clone(), group.ids.clone()))
            .collect();
        for (prefix, ids) in groups {
            let candidates = prefix.resolve(message);
            if let Some(parsed) = parse::parse_with(content, &candidates) {
                return Some((parsed, ids));
            }
        }
        None
    }

    /// Run a message through the dispatch pipeline.
    ///
    /// Messages that are not command invocations resolve to
    /// [`Dispatch::Ignored`]; only handler failures and internal faults
    /// surface as errors.
    pub async fn dispatch(&self, message: &Message) -> Result<Dispatch> {
        let (parsed, restriction) =
            match parse::parse_with(&message.content, &self.default_prefixes(message)) {
                Some(parsed) => (parsed, None),
                None => match self.parse_with_overrides(&message.content, message) {
                    Some((parsed, ids)) => (parsed, Some(ids)),
                    None => return Ok(Dispatch::Ignored),
                },
            };

        let id = {
            let Ok(aliases) = self.aliases.read() else {
                return Err(Error::Internal("lock poisoned".to_string()));
            };
            aliases.get(&parsed.alias).cloned()
        };
        let Some(id) = id else {
            debug!(alias = %parsed.alias, "unknown command alias");
            return Ok(Dispatch::Ignored);
        };
        if let Some(ids) = &restriction {
            if !ids.contains(&id) {
                return Ok(Dispatch::Ignored);
            }
        }
        // A stale alias pointing at a removed command fires nothing.
        let Some(entry) = self.base.get(&id) else {
            return Ok(Dispatch::Ignored);
        };
        let command = Arc::clone(entry.instance());

        if let Some(spec) = command.bot_permissions() {
            match spec.check(message, &message.bot_permissions).await {
                PermissionCheck::Granted => {}
                PermissionCheck::Missing(missing) => {
                    self.notify_missing(&id, message, Some(&missing), PermissionSide::Client);
                    return Ok(Dispatch::Blocked {
                        id,
                        missing: Some(missing),
                        on: PermissionSide::Client,
                    });
                }
                PermissionCheck::Denied => {
                    self.notify_missing(&id, message, None, PermissionSide::Client);
                    return Ok(Dispatch::Blocked {
                        id,
                        missing: None,
                        on: PermissionSide::Client,
                    });
                }
            }
        }
        if let Some(spec) = command.user_permissions() {
            match spec.check(message, &message.author_permissions).await {
                PermissionCheck::Granted => {}
                PermissionCheck::Missing(missing) => {
                    self.notify_missing(&id, message, Some(&missing), PermissionSide::User);
                    return Ok(Dispatch::Blocked {
                        id,
                        missing: Some(missing),
                        on: PermissionSide::User,
                    });
                }
                PermissionCheck::Denied => {
                    self.notify_missing(&id, message, None, PermissionSide::User);
                    return Ok(Dispatch::Blocked {
                        id,
                        missing: None,
                        on: PermissionSide::User,
                    });
                }
            }
        }

        let ctx = CommandContext {
            message: message.clone(),
            alias: parsed.alias,
            args: parsed.args,
        };
        command.exec(ctx).await?;
        debug!(command = %id, "command executed");
        Ok(Dispatch::Executed { id })
    }

    /// Re-run dispatch for an edited message, but only when edit handling
    /// is enabled and the text actually changed.
    pub async fn dispatch_update(&self, before: &Message, after: &Message) -> Result<Dispatch> {
        if !self.handle_edits || before.content == after.content {
            return Ok(Dispatch::Ignored);
        }
        self.dispatch(after).await
    }

    /// Wire the registry to a host client's event source.
    ///
    /// Message handlers are bound once the client signals `ready`; each
    /// incoming message is dispatched on its own task.
    /// `interaction_create` is a reserved extension point and stays
    /// unbound.
    pub fn attach(self: &Arc<Self>, client_events: &Arc<Emitter>) {
        let registry = Arc::clone(self);
        let events = Arc::clone(client_events);
        client_events.once(
            "ready",
            Arc::new(move |_payload| {
                let create_registry = Arc::clone(&registry);
                events.on(
                    "message_create",
                    Arc::new(move |payload| {
                        let message: Message = match serde_json::from_value(payload.clone()) {
                            Ok(message) => message,
                            Err(_) => {
                                warn!(
                                    "{}",
                                    Error::NotAnInstance {
                                        value: "payload".to_string(),
                                        class: "Message",
                                    }
                                );
                                return;
                            }
                        };
                        let registry = Arc::clone(&create_registry);
                        tokio::spawn(async move {
                            if let Err(e) = registry.dispatch(&message).await {
                                error!(error = %e, "command dispatch failed");
                            }
                        });
                    }),
                );

                let update_registry = Arc::clone(&registry);
                events.on(
                    "message_update",
                    Arc::new(move |payload| {
                        let update: MessageUpdate = match serde_json::from_value(payload.clone())
                        {
                            Ok(update) => update,
                            Err(_) => {
                                warn!(
                                    "{}",
                                    Error::NotAnInstance {
                                        value: "payload".to_string(),
                                        class: "MessageUpdate",
                                    }
                                );
                                return;
                            }
                        };
                        let registry = Arc::clone(&update_registry);
                        tokio::spawn(async move {
                            if let Err(e) =
                                registry.dispatch_update(&update.before, &update.after).await
                            {
                                error!(error = %e, "command dispatch failed");
                            }
                        });
                    }),
                );
            }),
        );
    }
}

#[async_trait]
impl Registry for CommandRegistry {
    type Module = dyn Command;

    fn base(&self) -> &ModuleRegistry<dyn Command> {
        &self.base
    }

    /// Base registration plus alias and prefix indexing. Alias collisions
    /// are validated up front so a rejected command leaves no partial
    /// state behind.
    fn register(&self, entry: ModuleEntry<dyn Command>, is_reload: bool) -> Result<()> {
        let command = Arc::clone(entry.instance());
        let id = entry.id().to_string();

        {
            let aliases = self
                .aliases
                .read()
                .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
            let mut seen = BTreeSet::new();
            for alias in command.aliases() {
                if aliases.contains(alias) || !seen.insert(alias) {
                    return Err(Error::NotUnique(alias.clone()));
                }
            }
        }

        self.base.insert(entry, is_reload)?;

        {
            let mut aliases = self
                .aliases
                .write()
                .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
            for alias in command.aliases() {
                aliases.insert(alias.clone(), id.clone())?;
            }
        }
        if let Some(prefix) = command.prefix() {
            self.index_prefix(prefix, &id)?;
        }
        Ok(())
    }

    /// Base removal plus purging of the command's aliases and prefix
    /// membership, so no dangling index entries survive.
    fn remove_with(&self, id: &str, is_reload: bool) -> Result<ModuleEntry<dyn Command>> {
        let entry = self.base.take(id, is_reload)?;
        self.unindex(id, entry.instance().aliases());
        Ok(entry)
    }
}
