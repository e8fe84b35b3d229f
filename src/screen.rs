use crate::widget::{self, SharedWidget, WidgetError};
use std::fmt;

/// Runs on the render thread each time the screen is shown, before any widget is drawn. It may
/// freely mutate widgets (e.g. update a text box) since nothing else renders them meanwhile.
pub type RenderHook = Box<dyn Fn(&Screen) + Send + Sync>;

/// An ordered set of widgets shown together.
pub struct Screen {
    widgets: Vec<SharedWidget>,
    on_render: Option<RenderHook>,
}

#[derive(Debug, thiserror::Error)]
#[error("widget #{index} ({kind}) failed to initialise")]
pub struct WidgetInitError {
    pub index: usize,
    pub kind: &'static str,
    #[source]
    pub source: WidgetError,
}

impl Screen {
    pub fn new(widgets: Vec<SharedWidget>) -> Screen {
        Screen {
            widgets,
            on_render: None,
        }
    }

    pub fn with_hook(widgets: Vec<SharedWidget>, hook: impl Fn(&Screen) + Send + Sync + 'static) -> Screen {
        Screen {
            widgets,
            on_render: Some(Box::new(hook)),
        }
    }

    pub fn widgets(&self) -> &[SharedWidget] {
        &self.widgets
    }

    pub fn widget(&self, index: usize) -> Option<&SharedWidget> {
        self.widgets.get(index)
    }

    /// Initialises every widget in order, stopping at the first failure. A screen that failed to
    /// initialise must not be shown.
    pub fn init(&self) -> Result<(), WidgetInitError> {
        for (index, shared) in self.widgets.iter().enumerate() {
            let mut widget = widget::lock(shared);
            widget.init().map_err(|source| WidgetInitError {
                index,
                kind: widget.kind(),
                source,
            })?;
        }
        Ok(())
    }

    pub(crate) fn run_hook(&self) {
        if let Some(hook) = &self.on_render {
            hook(self);
        }
    }
}

impl fmt::Debug for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screen")
            .field("widgets", &self.widgets.len())
            .field("on_render", &self.on_render.is_some())
            .finish()
    }
}
