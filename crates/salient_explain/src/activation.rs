//! Forward hooks and activation capture.
//!
//! A [`HookRegistry`] is handed to [`ImageClassifier::forward_observed`] as
//! the layer observer. Registering a hook returns a [`HookHandle`]; the hook
//! stays active until the handle is dropped, so an early return or `?`
//! cannot leave it behind.
//!
//! [`ImageClassifier::forward_observed`]: salient_core::ImageClassifier::forward_observed

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use burn::prelude::*;
use salient_core::LayerObserver;

use crate::error::{ExplainError, Result};

/// Captured activations from model layers.
#[derive(Debug, Clone)]
pub struct ActivationCapture<B: Backend> {
    activations: HashMap<String, Tensor<B, 4>>,
}

impl<B: Backend> ActivationCapture<B> {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self {
            activations: HashMap::new(),
        }
    }

    /// Store an activation, replacing an earlier one for the same layer.
    pub fn store(&mut self, name: &str, activation: Tensor<B, 4>) {
        self.activations.insert(name.to_string(), activation);
    }

    /// Get an activation by name.
    pub fn get(&self, name: &str) -> Option<&Tensor<B, 4>> {
        self.activations.get(name)
    }

    /// Remove and return an activation.
    pub fn take(&mut self, name: &str) -> Option<Tensor<B, 4>> {
        self.activations.remove(name)
    }

    /// Names of the captured layers.
    pub fn names(&self) -> Vec<&str> {
        self.activations.keys().map(|s| s.as_str()).collect()
    }

    /// Clear all stored activations.
    pub fn clear(&mut self) {
        self.activations.clear();
    }
}

impl<B: Backend> Default for ActivationCapture<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward hooks on a model's named layers.
#[derive(Debug)]
pub struct HookRegistry<B: Backend> {
    layers: Vec<String>,
    hooks: RefCell<Vec<(usize, String)>>,
    next_id: Cell<usize>,
    capture: RefCell<ActivationCapture<B>>,
}

impl<B: Backend> HookRegistry<B> {
    /// Create a registry for a model exposing `layers`.
    pub fn new(layers: Vec<String>) -> Self {
        Self {
            layers,
            hooks: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            capture: RefCell::new(ActivationCapture::new()),
        }
    }

    /// Hook the layer named exactly `layer`.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::UnknownLayer`] unless exactly one of the
    /// model's layers has that name.
    pub fn register(&self, layer: &str) -> Result<HookHandle<'_, B>> {
        let matches = self.layers.iter().filter(|name| *name == layer).count();
        if matches != 1 {
            return Err(ExplainError::UnknownLayer {
                name: layer.to_string(),
                available: self.layers.clone(),
            });
        }

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.hooks.borrow_mut().push((id, layer.to_string()));
        Ok(HookHandle { registry: self, id })
    }

    /// Number of hooks currently registered.
    pub fn active(&self) -> usize {
        self.hooks.borrow().len()
    }

    /// Remove and return the captured output of `layer`.
    pub fn take(&self, layer: &str) -> Option<Tensor<B, 4>> {
        self.capture.borrow_mut().take(layer)
    }

    fn remove(&self, id: usize) {
        self.hooks.borrow_mut().retain(|(hook, _)| *hook != id);
    }
}

impl<B: Backend> LayerObserver<B> for HookRegistry<B> {
    fn observe(&self, name: &str, output: &Tensor<B, 4>) {
        let hooked = self.hooks.borrow().iter().any(|(_, layer)| layer == name);
        if hooked {
            self.capture.borrow_mut().store(name, output.clone());
        }
    }
}

/// Registration of one forward hook. Dropping it removes the hook.
#[derive(Debug)]
pub struct HookHandle<'a, B: Backend> {
    registry: &'a HookRegistry<B>,
    id: usize,
}

impl<B: Backend> HookHandle<'_, B> {
    /// Remove the hook now.
    pub fn remove(self) {}
}

impl<B: Backend> Drop for HookHandle<'_, B> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
