//! Typed `(category, strategy) -> handler` dispatch table.
//!
//! The table is built once and checked against the [`CategoryRegistry`]:
//! every declared strategy must have a handler and every handler must belong
//! to a declared strategy, so dispatch can never hit an unknown name.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::domain::{CategoryName, FixOutcome, Issue, MendError, RecoveryContext, Result, StepKind};
use crate::registry::CategoryRegistry;

/// Everything a handler gets to see about the attempt it is asked to make.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub category: CategoryName,
    pub strategy: String,
    pub kind: StepKind,
    /// Issues classified into `category` for this run.
    pub issues: Vec<Issue>,
    pub recovery: RecoveryContext,
}

/// A repair entry point provided by an external fixer.
#[async_trait]
pub trait RepairHandler: Send + Sync {
    async fn apply(&self, ctx: &StrategyContext) -> anyhow::Result<FixOutcome>;
}

type HandlerFn = dyn Fn(StrategyContext) -> BoxFuture<'static, anyhow::Result<FixOutcome>> + Send + Sync;

/// Adapter turning an async closure into a [`RepairHandler`].
pub struct FnHandler {
    f: Box<HandlerFn>,
}

#[async_trait]
impl RepairHandler for FnHandler {
    async fn apply(&self, ctx: &StrategyContext) -> anyhow::Result<FixOutcome> {
        (self.f)(ctx.clone()).await
    }
}

/// Wrap an async closure `StrategyContext -> anyhow::Result<FixOutcome>`.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RepairHandler>
where
    F: Fn(StrategyContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<FixOutcome>> + Send + 'static,
{
    Arc::new(FnHandler {
        f: Box::new(move |ctx| f(ctx).boxed()),
    })
}

/// Immutable dispatch table.
#[derive(Clone)]
pub struct HandlerTable {
    handlers: HashMap<(CategoryName, String), Arc<dyn RepairHandler>>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .handlers
            .keys()
            .map(|(c, s)| format!("{c}.{s}"))
            .collect();
        keys.sort();
        f.debug_struct("HandlerTable").field("handlers", &keys).finish()
    }
}

impl HandlerTable {
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    pub fn get(&self, category: CategoryName, strategy: &str) -> Option<&Arc<dyn RepairHandler>> {
        self.handlers.get(&(category, strategy.to_string()))
    }

    /// Lookup that treats a missing entry as a pipeline error.
    pub fn require(&self, category: CategoryName, strategy: &str) -> Result<&Arc<dyn RepairHandler>> {
        self.get(category, strategy)
            .ok_or_else(|| MendError::MissingHandler {
                category,
                strategy: strategy.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Collects handlers before the registry check in [`HandlerTableBuilder::build`].
#[derive(Default)]
pub struct HandlerTableBuilder {
    handlers: HashMap<(CategoryName, String), Arc<dyn RepairHandler>>,
}

impl HandlerTableBuilder {
    /// Register a handler. A later registration for the same key replaces
    /// the earlier one.
    pub fn register(
        mut self,
        category: CategoryName,
        strategy: impl Into<String>,
        handler: Arc<dyn RepairHandler>,
    ) -> Self {
        self.handlers.insert((category, strategy.into()), handler);
        self
    }

    /// Register the same handler for every declared strategy of every category.
    pub fn register_all(mut self, registry: &CategoryRegistry, handler: Arc<dyn RepairHandler>) -> Self {
        for category in registry.iter() {
            for strategy in category.all_strategies() {
                self.handlers
                    .insert((category.name, strategy.to_string()), Arc::clone(&handler));
            }
        }
        self
    }

    /// Validate against the registry and freeze the table.
    pub fn build(self, registry: &CategoryRegistry) -> Result<HandlerTable> {
        for (category, strategy) in self.handlers.keys() {
            let declared = registry
                .get(*category)
                .map(|c| c.declares(strategy))
                .unwrap_or(false);
            if !declared {
                return Err(MendError::UndeclaredStrategy {
                    category: *category,
                    strategy: strategy.clone(),
                });
            }
        }

        for category in registry.iter() {
            for strategy in category.all_strategies() {
                if !self.handlers.contains_key(&(category.name, strategy.to_string())) {
                    return Err(MendError::MissingHandler {
                        category: category.name,
                        strategy: strategy.to_string(),
                    });
                }
            }
        }

        Ok(HandlerTable {
            handlers: self.handlers,
        })
    }
}
