//! The engine handle: configuration, contexts, lifecycle and the event loop.

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigOverrides};
use crate::context::Context;
use crate::disable;
use crate::dom::{ContentWriter, Document, DocumentEvent, NodeId, ReadyState};
use crate::errors::EngineError;
use crate::evaluator::{BuiltinEvaluator, ExpressionEvaluator};
use crate::intercept::InterceptingWriter;
use crate::pipeline::ChangePipeline;
use crate::scanner;
use crate::template;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How [`Engine::set_content`] commits its rendered string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentMode {
    #[default]
    Text,
    Markup,
}

/// State shared between the engine and its write interceptor.
pub(crate) struct Core {
    pub(crate) config: Config,
    pub(crate) context: Context,
    pub(crate) evaluator: Arc<dyn ExpressionEvaluator>,
}

impl Default for Core {
    fn default() -> Self {
        Self::new(Config::default(), Context::default(), Arc::new(BuiltinEvaluator::default()))
    }
}

impl Core {
    pub(crate) fn new(config: Config, context: Context, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            config,
            context,
            evaluator,
        }
    }

    /// Evaluate against the merged context. Failures become `[Error: ...]` strings.
    pub(crate) fn evaluate(&self, expression: &str, base: Option<&Map<String, Value>>) -> Option<Value> {
        let scope = match base {
            Some(base) => self.context.scope_over(base),
            None => self.context.scope(),
        };
        match self.evaluator.evaluate(expression, &scope) {
            Ok(value) => value,
            Err(error) => {
                warn!(expression, %error, "expression evaluation failed");
                Some(Value::String(format!("[Error: {error}]")))
            }
        }
    }

    pub(crate) fn evaluate_text<'a>(&self, source: &'a str) -> Cow<'a, str> {
        template::substitute(self.config.template_delimiter.regex(), source, |expression| {
            self.evaluate(expression, None)
        })
    }

    pub(crate) fn is_disabled(&self, doc: &Document, node: NodeId) -> bool {
        disable::is_disabled(doc, node, &self.config.disable_attribute)
    }
}

/// A template engine bound to one document.
///
/// Time is virtual: the host drives it with [`Engine::pump`],
/// [`Engine::advance`] and [`Engine::run_until_idle`].
pub struct Engine {
    document: Document,
    core: Rc<RefCell<Core>>,
    /// Writer captured at construction, before any interception.
    native: Rc<dyn ContentWriter>,
    pipeline: ChangePipeline,
    now: Duration,
    started: bool,
    awaiting_ready: bool,
    intercepting: bool,
}

impl Engine {
    pub fn new(document: Document) -> Result<Self, EngineError> {
        Self::with_evaluator(document, Arc::new(BuiltinEvaluator::default()))
    }

    pub fn with_evaluator(
        document: Document,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Result<Self, EngineError> {
        if document.body().is_none() {
            return Err(EngineError::Environment("document has no body element".into()));
        }
        let native = document.writer();
        Ok(Self {
            document,
            core: Rc::new(RefCell::new(Core::new(
                Config::default(),
                Context::default(),
                evaluator,
            ))),
            native,
            pipeline: ChangePipeline::default(),
            now: Duration::ZERO,
            started: false,
            awaiting_ready: false,
            intercepting: false,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Tear the engine down and hand the document back with its native writer.
    pub fn into_document(mut self) -> Document {
        self.destroy();
        self.document
    }

    // ---- lifecycle --------------------------------------------------------

    /// Merge `overrides`, install interception and render the document.
    ///
    /// On a document that is still loading, the initial scan and the watcher
    /// wait for the ready event (see [`Engine::pump`]).
    pub fn initialize(&mut self, overrides: ConfigOverrides) -> Result<&mut Self, EngineError> {
        self.apply_config(&overrides)?;
        self.install_interception();
        if self.document.ready_state() == ReadyState::Complete {
            self.start();
        } else {
            debug!("document loading; start deferred until ready");
            self.awaiting_ready = true;
        }
        info!(version = VERSION, "engine initialized");
        Ok(self)
    }

    /// Merge `overrides` into the running configuration.
    ///
    /// Only `debounceTime` and `observeMutations` changes recreate the watcher.
    pub fn configure(&mut self, overrides: ConfigOverrides) -> Result<&mut Self, EngineError> {
        let watcher_changed = self.apply_config(&overrides)?;
        if watcher_changed && self.started {
            self.reestablish_watcher();
        }
        Ok(self)
    }

    /// Cancel the watcher (and any pending batch) and restore the native writer.
    pub fn destroy(&mut self) -> &mut Self {
        self.pipeline.teardown(&mut self.document);
        if self.intercepting {
            self.document.set_writer(Rc::clone(&self.native));
            self.intercepting = false;
        }
        self.started = false;
        self.awaiting_ready = false;
        info!("engine destroyed");
        self
    }

    fn apply_config(&mut self, overrides: &ConfigOverrides) -> Result<bool, EngineError> {
        let mut core = self.core.borrow_mut();
        let (config, watcher_changed) = core.config.merged(overrides)?;
        core.config = config;
        if let Some(entries) = &overrides.eval_context {
            core.context.merge_base(entries.clone());
        }
        Ok(watcher_changed)
    }

    fn install_interception(&mut self) {
        let writer = InterceptingWriter::new(Rc::clone(&self.native), Rc::clone(&self.core));
        self.document.set_writer(Rc::new(writer));
        self.intercepting = true;
    }

    fn start(&mut self) {
        self.awaiting_ready = false;
        self.started = true;
        let root = self.default_root();
        self.quietly(|engine| {
            let core = engine.core.borrow();
            scanner::scan(&core, &mut engine.document, root);
        });
        self.establish_watcher();
    }

    fn establish_watcher(&mut self) {
        let (observe, debounce) = {
            let core = self.core.borrow();
            (core.config.observe_mutations, core.config.debounce_time)
        };
        if observe {
            let root = self.document.root();
            self.pipeline.setup(&mut self.document, root, debounce);
        } else {
            self.pipeline.teardown(&mut self.document);
        }
    }

    /// Like `establish_watcher`, but pending host mutations survive the swap.
    /// Switching observation off processes them immediately instead.
    fn reestablish_watcher(&mut self) {
        let (observe, debounce) = {
            let core = self.core.borrow();
            (core.config.observe_mutations, core.config.debounce_time)
        };
        if observe {
            let root = self.document.root();
            self.pipeline
                .reconfigure(&mut self.document, root, debounce, self.now);
        } else {
            {
                let core = self.core.borrow();
                self.pipeline.flush_now(&core, &mut self.document, self.now);
            }
            self.pipeline.teardown(&mut self.document);
        }
    }

    fn default_root(&self) -> NodeId {
        self.document.body().unwrap_or_else(|| self.document.root())
    }

    /// Run engine-initiated writes without feeding them back into the pipeline.
    ///
    /// Host mutations queued before `f` runs are delivered first and kept.
    fn quietly<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.pipeline.deliver(&mut self.document, self.now);
        let out = f(self);
        self.pipeline.discard_pending(&mut self.document);
        out
    }

    // ---- public operations ------------------------------------------------

    /// Scan `root` (default: the body) once.
    pub fn scan(&mut self, root: Option<NodeId>) -> &mut Self {
        let root = root.unwrap_or_else(|| self.default_root());
        self.quietly(|engine| {
            let core = engine.core.borrow();
            scanner::scan(&core, &mut engine.document, root);
        });
        self
    }

    /// Merge `entries` into the custom context; existing names are overwritten.
    pub fn add_to_context(&mut self, entries: Map<String, Value>) -> &mut Self {
        self.core.borrow_mut().context.extend(entries);
        self
    }

    /// Replace the base (global) context.
    pub fn set_base_context(&mut self, base: Map<String, Value>) -> &mut Self {
        self.core.borrow_mut().context.set_base(base);
        self
    }

    pub fn evaluate(&self, expression: &str) -> Option<Value> {
        self.core.borrow().evaluate(expression, None)
    }

    /// Evaluate with `base` standing in for the base context.
    pub fn evaluate_with(&self, expression: &str, base: &Map<String, Value>) -> Option<Value> {
        self.core.borrow().evaluate(expression, Some(base))
    }

    pub fn evaluate_text<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.core.borrow().evaluate_text(text)
    }

    /// Substitute strings; every other value passes through untouched.
    pub fn evaluate_value(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.evaluate_text(&s).into_owned()),
            other => other,
        }
    }

    /// Render `content` and assign it as the node's text or markup.
    pub fn set_content(&mut self, node: NodeId, content: &str, mode: ContentMode) -> &mut Self {
        let rendered = self.evaluate_text(content).into_owned();
        match mode {
            ContentMode::Text => self.native.write_text(&mut self.document, node, rendered),
            ContentMode::Markup => self.native.write_markup(&mut self.document, node, rendered),
        }
        self
    }

    pub fn disable(&mut self, node: NodeId) -> &mut Self {
        let attribute = self.config().disable_attribute;
        self.document.set_attribute(node, &attribute, "");
        self
    }

    /// Remove the disable marker and immediately rescan the subtree.
    pub fn enable(&mut self, node: NodeId) -> &mut Self {
        let attribute = self.config().disable_attribute;
        self.quietly(|engine| {
            engine.document.remove_attribute(node, &attribute);
            let core = engine.core.borrow();
            scanner::scan(&core, &mut engine.document, node);
        });
        self
    }

    pub fn is_disabled(&self, node: NodeId) -> bool {
        self.core.borrow().is_disabled(&self.document, node)
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Config {
        self.core.borrow().config.clone()
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    pub fn is_watching(&self) -> bool {
        self.pipeline.is_active()
    }

    pub fn is_intercepting(&self) -> bool {
        self.intercepting
    }

    /// Number of debounced batches processed so far.
    pub fn processing_passes(&self) -> u64 {
        self.pipeline.passes()
    }

    // ---- event loop -------------------------------------------------------

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Dispatch document events, then deliver queued mutation records.
    pub fn pump(&mut self) -> &mut Self {
        for event in self.document.take_events() {
            match event {
                DocumentEvent::Ready if self.awaiting_ready => self.start(),
                DocumentEvent::Ready => {}
            }
        }
        self.pipeline.deliver(&mut self.document, self.now);
        self
    }

    /// Move the clock forward by `by`, firing the debounce timer when it elapses.
    pub fn advance(&mut self, by: Duration) -> &mut Self {
        let target = self.now + by;
        self.pump();
        while let Some(deadline) = self.pipeline.deadline() {
            if deadline > target {
                break;
            }
            self.now = self.now.max(deadline);
            {
                let core = self.core.borrow();
                self.pipeline.flush_if_due(&core, &mut self.document, self.now);
            }
            self.pump();
        }
        self.now = target;
        self
    }

    /// Advance until no debounce timer is pending.
    pub fn run_until_idle(&mut self) -> &mut Self {
        self.pump();
        while let Some(deadline) = self.pipeline.deadline() {
            let step = deadline.saturating_sub(self.now);
            self.advance(step);
        }
        self
    }
}
