use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use dwqcore::input::Data;

use crate::handle::WorkHandle;

/// Terminal result returned by a body.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkOutcome {
    Success(Data),
    Retry,
    Failure(Data),
}

impl WorkOutcome {
    pub fn success() -> Self {
        Self::Success(Data::default())
    }

    pub fn failure() -> Self {
        Self::Failure(Data::default())
    }
}

/// A user-supplied task body. A fresh instance is built for every
/// attempt; the body is opaque to the engine beyond its outcome.
#[async_trait]
pub trait Worker: Send {
    async fn run(&mut self, input: Data, handle: WorkHandle) -> WorkOutcome;
}

/// Builds body instances for one class key.
pub trait WorkerFactory: Send + Sync {
    fn build(&self) -> Box<dyn Worker>;
}

impl<F> WorkerFactory for F
where
    F: Fn() -> Box<dyn Worker> + Send + Sync,
{
    fn build(&self) -> Box<dyn Worker> {
        (self)()
    }
}

/// Explicit mapping from class keys to body factories, populated by
/// the host at init; an unknown key at dispatch fails the record.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    factories: HashMap<String, Arc<dyn WorkerFactory>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        class_key: impl Into<String>,
        factory: impl WorkerFactory + 'static,
    ) -> &mut Self {
        let class_key = class_key.into();
        if self.factories.insert(class_key.clone(), Arc::new(factory)).is_some() {
            log::warn!("worker for class key {class_key} re-registered");
        }
        self
    }

    pub fn contains(&self, class_key: &str) -> bool {
        self.factories.contains_key(class_key)
    }

    pub fn build(&self, class_key: &str) -> Option<Box<dyn Worker>> {
        self.factories
            .get(class_key)
            .map(|factory| factory.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    #[async_trait]
    impl Worker for Nop {
        async fn run(&mut self, _input: Data, _handle: WorkHandle) -> WorkOutcome {
            WorkOutcome::success()
        }
    }

    #[test]
    fn register_and_build() {
        let mut registry = WorkerRegistry::new();
        registry.register("nop", || Box::new(Nop) as Box<dyn Worker>);
        assert!(registry.contains("nop"));
        assert!(registry.build("nop").is_some());
        assert!(registry.build("missing").is_none());
    }
}
