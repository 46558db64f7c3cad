// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Marshals graphics-context work onto the thread that owns the context.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::RenderContext;
use crate::error::{InteropError, Result};
use crate::interop::TextureId;

type Job = Box<dyn FnOnce(&dyn RenderContext) + Send>;

/// Queue of work for the render thread.
///
/// Work submitted from the render thread runs inline. Work from any other
/// thread is queued and runs the next time the render thread calls
/// [`pump`](ContextDispatcher::pump).
#[derive(Clone)]
pub struct ContextDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    context: Arc<dyn RenderContext>,
    tx: Sender<Job>,
    rx: Receiver<Job>,
    timeout: Duration,
}

impl Drop for DispatcherInner {
    fn drop(&mut self) {
        if !self.rx.is_empty() {
            tracing::warn!(
                "ContextDispatcher dropped with {} render-thread jobs never pumped; native resources leaked",
                self.rx.len()
            );
        }
    }
}

impl ContextDispatcher {
    pub fn new(context: Arc<dyn RenderContext>, timeout: Duration) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            inner: Arc::new(DispatcherInner {
                context,
                tx,
                rx,
                timeout,
            }),
        }
    }

    pub fn context(&self) -> &Arc<dyn RenderContext> {
        &self.inner.context
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Whether the caller is on the render thread.
    pub fn is_render_thread(&self) -> bool {
        self.inner.context.is_current_thread()
    }

    /// Jobs waiting for the next pump.
    pub fn pending(&self) -> usize {
        self.inner.rx.len()
    }

    /// Run `f` on the render thread and wait for its result.
    pub fn run_blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&dyn RenderContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.run_blocking_or_reclaim(f, |_, _| {})
    }

    /// Like [`run_blocking`](Self::run_blocking), but if the caller gave up
    /// waiting before the job ran, `reclaim` receives the late result on the
    /// render thread so anything it allocated can be released.
    pub fn run_blocking_or_reclaim<F, R, C>(&self, f: F, reclaim: C) -> Result<R>
    where
        F: FnOnce(&dyn RenderContext) -> R + Send + 'static,
        C: FnOnce(&dyn RenderContext, R) + Send + 'static,
        R: Send + 'static,
    {
        let context = &self.inner.context;
        if context.is_current_thread() {
            return Ok(f(context.as_ref()));
        }

        tracing::trace!("ContextDispatcher: dispatching to render thread");
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move |ctx| {
            let result = f(ctx);
            if let Err(crossbeam_channel::SendError(late)) = result_tx.send(result) {
                tracing::debug!("ContextDispatcher: caller gone, reclaiming late result");
                reclaim(ctx, late);
            }
        });
        self.inner
            .tx
            .send(job)
            .map_err(|_| InteropError::Other(anyhow::anyhow!("Render dispatch queue closed")))?;

        match result_rx.recv_timeout(self.inner.timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => {
                let ms = self.inner.timeout.as_millis() as u64;
                tracing::warn!("ContextDispatcher: render thread did not respond within {}ms", ms);
                Err(InteropError::DispatchTimeout(ms))
            }
            Err(RecvTimeoutError::Disconnected) => Err(InteropError::Other(anyhow::anyhow!(
                "Render thread dropped dispatched work"
            ))),
        }
    }

    /// Run `f` on the render thread without waiting.
    pub fn run_async<F>(&self, f: F)
    where
        F: FnOnce(&dyn RenderContext) + Send + 'static,
    {
        let context = &self.inner.context;
        if context.is_current_thread() {
            f(context.as_ref());
            return;
        }
        // The receiver lives in the same Arc, so the send cannot fail.
        let _ = self.inner.tx.send(Box::new(f));
    }

    /// Delete textures on the render thread, deferring if necessary.
    pub fn delete_textures(&self, textures: Vec<TextureId>) {
        if textures.is_empty() {
            return;
        }
        self.run_async(move |ctx| {
            for texture in textures {
                ctx.delete_texture(texture);
            }
        });
    }

    /// Run every queued job. Only does work on the render thread.
    ///
    /// Returns the number of jobs run.
    pub fn pump(&self) -> usize {
        let context = &self.inner.context;
        if !context.is_current_thread() {
            tracing::warn!("ContextDispatcher: pump called off the render thread");
            return 0;
        }
        let mut ran = 0;
        while let Ok(job) = self.inner.rx.try_recv() {
            job(context.as_ref());
            ran += 1;
        }
        ran
    }
}

impl std::fmt::Debug for ContextDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextDispatcher")
            .field("pending", &self.pending())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}
