use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    context::TickerContext,
    traits::{HandlerRegistry, TickerHandler},
    SchedulerError, SchedulerResult,
};

type HandlerFactory = Arc<dyn Fn() -> Arc<dyn TickerHandler> + Send + Sync>;

#[derive(Clone)]
enum HandlerEntry {
    /// 单例，所有执行共享同一个实例
    Instance(Arc<dyn TickerHandler>),
    /// 每次解析时由工厂构造新实例
    Factory(HandlerFactory),
}

/// 用闭包实现的处理函数
pub struct FnHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> TickerHandler for FnHandler<F>
where
    F: Fn(TickerContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn invoke(&self, context: TickerContext) -> anyhow::Result<()> {
        (self.func)(context).await
    }
}

/// 只读的处理函数注册表，由 [`HandlerRegistryBuilder`] 构建
#[derive(Clone, Default)]
pub struct DefaultHandlerRegistry {
    handlers: Arc<HashMap<String, HandlerEntry>>,
}

impl DefaultHandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl HandlerRegistry for DefaultHandlerRegistry {
    fn resolve(&self, function: &str) -> Option<Arc<dyn TickerHandler>> {
        match self.handlers.get(function)? {
            HandlerEntry::Instance(handler) => Some(Arc::clone(handler)),
            HandlerEntry::Factory(factory) => Some(factory()),
        }
    }

    fn contains(&self, function: &str) -> bool {
        self.handlers.contains_key(function)
    }

    fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, HandlerEntry>,
    duplicates: Vec<String>,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self, name: impl Into<String>, handler: Arc<dyn TickerHandler>) -> Self {
        self.insert(name.into(), HandlerEntry::Instance(handler))
    }

    pub fn register_fn<F, Fut>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(TickerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(name, Arc::new(FnHandler { func }))
    }

    /// 工厂在每次执行前被调用，决定处理函数所属对象如何构造
    pub fn register_factory<F>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn TickerHandler> + Send + Sync + 'static,
    {
        self.insert(name.into(), HandlerEntry::Factory(Arc::new(factory)))
    }

    fn insert(mut self, name: String, entry: HandlerEntry) -> Self {
        if self.handlers.insert(name.clone(), entry).is_some() {
            self.duplicates.push(name);
        }
        self
    }

    pub fn build(self) -> SchedulerResult<DefaultHandlerRegistry> {
        if !self.duplicates.is_empty() {
            return Err(SchedulerError::config_error(format!(
                "处理函数重复注册: {:?}",
                self.duplicates
            )));
        }
        if let Some(name) = self.handlers.keys().find(|name| name.trim().is_empty()) {
            return Err(SchedulerError::config_error(format!(
                "处理函数名称不能为空: {name:?}"
            )));
        }

        debug!("处理函数注册完成，共 {} 个", self.handlers.len());
        Ok(DefaultHandlerRegistry {
            handlers: Arc::new(self.handlers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait]
    impl TickerHandler for Noop {
        async fn invoke(&self, _context: TickerContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_resolve_registered_and_missing() {
        let registry = DefaultHandlerRegistry::builder()
            .register("noop", Arc::new(Noop))
            .register_fn("closure", |_ctx| async { Ok(()) })
            .build()
            .unwrap();

        assert!(registry.resolve("noop").is_some());
        assert!(registry.resolve("closure").is_some());
        assert!(registry.resolve("missing").is_none());
        assert!(registry.contains("noop"));
        assert_eq!(registry.function_names(), vec!["closure", "noop"]);
    }

    #[test]
    fn test_factory_invoked_per_resolve() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let registry = DefaultHandlerRegistry::builder()
            .register_factory("scoped", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Arc::new(Noop) as Arc<dyn TickerHandler>
            })
            .build()
            .unwrap();

        assert_eq!(built.load(Ordering::SeqCst), 0);
        registry.resolve("scoped");
        registry.resolve("scoped");
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = DefaultHandlerRegistry::builder()
            .register("noop", Arc::new(Noop))
            .register("noop", Arc::new(Noop))
            .build();
        assert!(matches!(result, Err(SchedulerError::Configuration(_))));
    }
}
