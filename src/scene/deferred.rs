use std::fmt;

use crate::renderable::{Renderable, RenderableId};

use super::Scene;

/// A structural scene change requested while a frame is being recorded.
pub enum SceneCommand {
    AddMesh(Box<dyn Renderable>),
    RemoveMesh(RenderableId),
    SetVisible(RenderableId, bool),
    SetRenderOrder(RenderableId, i32),
}

impl fmt::Debug for SceneCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddMesh(r) => f.debug_tuple("AddMesh").field(&r.core().label()).finish(),
            Self::RemoveMesh(id) => f.debug_tuple("RemoveMesh").field(id).finish(),
            Self::SetVisible(id, v) => f.debug_tuple("SetVisible").field(id).field(v).finish(),
            Self::SetRenderOrder(id, o) => f.debug_tuple("SetRenderOrder").field(id).field(o).finish(),
        }
    }
}

/// Commands applied at the start of the next frame, in submission order.
///
/// Buckets are iterated while renderables draw, so a draw callback can only
/// queue changes here.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    commands: Vec<SceneCommand>,
}

impl DeferredQueue {
    pub fn push(&mut self, command: SceneCommand) {
        self.commands.push(command);
    }

    pub fn add_mesh(&mut self, renderable: impl Renderable) {
        self.push(SceneCommand::AddMesh(Box::new(renderable)));
    }

    pub fn remove_mesh(&mut self, id: RenderableId) {
        self.push(SceneCommand::RemoveMesh(id));
    }

    pub fn set_visible(&mut self, id: RenderableId, visible: bool) {
        self.push(SceneCommand::SetVisible(id, visible));
    }

    pub fn set_render_order(&mut self, id: RenderableId, render_order: i32) {
        self.push(SceneCommand::SetRenderOrder(id, render_order));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn take(&mut self) -> Vec<SceneCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl Scene {
    pub(super) fn apply_deferred(&mut self) {
        let commands = self.deferred.take();
        if commands.is_empty() {
            return;
        }
        log::trace!("Applying {} deferred scene commands", commands.len());

        for command in commands {
            let result = match command {
                SceneCommand::AddMesh(renderable) => {
                    self.add_renderable(renderable);
                    Ok(())
                }
                SceneCommand::RemoveMesh(id) => {
                    self.remove_mesh(id);
                    Ok(())
                }
                SceneCommand::SetVisible(id, visible) => self.set_visible(id, visible),
                SceneCommand::SetRenderOrder(id, order) => self.set_render_order(id, order),
            };
            if let Err(err) = result {
                log::warn!("Deferred scene command failed: {err}");
            }
        }
    }
}
