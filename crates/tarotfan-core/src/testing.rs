// ABOUTME: Test utilities for tarotfan-core, including a stage that records every rendered view.
// ABOUTME: Used in tests to drive the table actor without a real rendering host.

use std::sync::Mutex;

use ulid::Ulid;

use crate::card::{CardGeometry, Rect, Viewport};
use crate::render::{Stage, TableView};

/// A stage that keeps every `TableView` it is asked to render and reports a
/// fixed geometry for every card.
#[derive(Debug)]
pub struct RecordingStage {
    viewport: Viewport,
    geometry: Option<CardGeometry>,
    frames: Mutex<Vec<TableView>>,
}

impl RecordingStage {
    pub fn new(viewport: Viewport, geometry: Option<CardGeometry>) -> Self {
        Self {
            viewport,
            geometry,
            frames: Mutex::new(Vec::new()),
        }
    }

    /// A 1000x800 viewport whose cards all sit at the bottom left, tilted.
    pub fn fixed() -> Self {
        Self::new(
            Viewport {
                width: 1000.0,
                height: 800.0,
            },
            Some(CardGeometry {
                rect: Rect {
                    left: 100.0,
                    top: 500.0,
                    width: 120.0,
                    height: 200.0,
                },
                rotation_deg: -10.0,
            }),
        )
    }

    pub fn last_frame(&self) -> Option<TableView> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl Stage for RecordingStage {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn capture_geometry(&self, _instance_id: Ulid) -> Option<CardGeometry> {
        self.geometry
    }

    fn render(&self, view: &TableView) {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(view.clone());
    }
}
