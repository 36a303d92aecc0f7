//! In-memory recording host used by the scenario tests.
//!
//! Keeps a node arena plus per-parent child lists so tests can assert the
//! final tree shape, and an ordered op log so they can assert what happened
//! and in what order.

use std::collections::{BTreeMap, HashMap};

use crate::errors::HostError;
use crate::host::{ContainerId, HostAdapter, HostParent, InstanceId, PropDiff};
use crate::types::{PropValue, Props};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HostOp {
    CreateInstance { id: InstanceId, ty: String },
    CreateText { id: InstanceId, text: String },
    AppendInitial { parent: InstanceId, child: InstanceId },
    AppendChild { parent: HostParent, child: InstanceId },
    InsertBefore { parent: HostParent, child: InstanceId, before: InstanceId },
    RemoveChild { parent: HostParent, child: InstanceId },
    CommitUpdate { id: InstanceId, diff: PropDiff },
    CommitTextUpdate { id: InstanceId, old: String, new: String },
    CommitMount { id: InstanceId },
    ResetTextContent { id: InstanceId },
}

#[derive(Debug, Default)]
pub(crate) struct TestNode {
    pub ty: String,
    pub text: Option<String>,
    pub props: BTreeMap<String, PropValue>,
    pub children: Vec<InstanceId>,
}

#[derive(Default)]
pub(crate) struct TestHost {
    next_id: usize,
    pub ops: Vec<HostOp>,
    pub nodes: HashMap<InstanceId, TestNode>,
    pub containers: HashMap<ContainerId, Vec<InstanceId>>,
    pub animation_requests: usize,
    pub deferred_requests: usize,
    /// When set, lone text children live on the instance's `children` prop
    /// instead of getting text nodes of their own.
    pub fold_text: bool,
}

impl TestHost {
    pub fn new() -> Self {
        TestHost::default()
    }

    fn allocate(&mut self) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn container_children(&self, container: ContainerId) -> Vec<InstanceId> {
        self.containers.get(&container).cloned().unwrap_or_default()
    }

    /// Every text reachable under `container`, in tree order.
    pub fn texts_in(&self, container: ContainerId) -> Vec<String> {
        let mut texts = Vec::new();
        for id in self.container_children(container) {
            self.collect_texts(id, &mut texts);
        }
        texts
    }

    fn collect_texts(&self, id: InstanceId, out: &mut Vec<String>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if let Some(text) = &node.text {
            out.push(text.clone());
        }
        for child in &node.children {
            self.collect_texts(*child, out);
        }
    }

    pub fn ops_since(&self, mark: usize) -> &[HostOp] {
        &self.ops[mark..]
    }

    fn children_mut(&mut self, parent: HostParent) -> &mut Vec<InstanceId> {
        match parent {
            HostParent::Container(container) => self.containers.entry(container).or_default(),
            HostParent::Instance(instance) => {
                &mut self
                    .nodes
                    .get_mut(&instance)
                    .expect("unknown parent instance")
                    .children
            }
        }
    }

    /// Remove `child` from wherever it currently sits. Insertions move nodes
    /// the way a DOM does.
    fn detach(&mut self, child: InstanceId) {
        for children in self.containers.values_mut() {
            children.retain(|c| *c != child);
        }
        for node in self.nodes.values_mut() {
            node.children.retain(|c| *c != child);
        }
    }
}

impl HostAdapter for TestHost {
    type HostContext = ();

    fn get_root_host_context(&mut self, _container: ContainerId) -> Self::HostContext {}

    fn get_child_host_context(&mut self, _parent: &Self::HostContext, _ty: &str) -> Self::HostContext {
    }

    fn should_set_text_content(&mut self, _ty: &str, _props: &Props) -> bool {
        self.fold_text
    }

    fn create_instance(
        &mut self,
        ty: &str,
        props: &Props,
        _container: ContainerId,
        _context: &Self::HostContext,
    ) -> Result<InstanceId, HostError> {
        let id = self.allocate();
        self.nodes.insert(
            id,
            TestNode {
                ty: ty.to_string(),
                text: None,
                props: (**props).clone(),
                children: Vec::new(),
            },
        );
        self.ops.push(HostOp::CreateInstance {
            id,
            ty: ty.to_string(),
        });
        Ok(id)
    }

    fn create_text_instance(
        &mut self,
        text: &str,
        _container: ContainerId,
        _context: &Self::HostContext,
    ) -> Result<InstanceId, HostError> {
        let id = self.allocate();
        self.nodes.insert(
            id,
            TestNode {
                ty: "#text".to_string(),
                text: Some(text.to_string()),
                ..TestNode::default()
            },
        );
        self.ops.push(HostOp::CreateText {
            id,
            text: text.to_string(),
        });
        Ok(id)
    }

    fn append_initial_child(
        &mut self,
        parent: InstanceId,
        child: InstanceId,
    ) -> Result<(), HostError> {
        self.nodes
            .get_mut(&parent)
            .ok_or_else(|| HostError("append to unknown instance".into()))?
            .children
            .push(child);
        self.ops.push(HostOp::AppendInitial { parent, child });
        Ok(())
    }

    fn finalize_initial_children(
        &mut self,
        _instance: InstanceId,
        _ty: &str,
        props: &Props,
        _container: ContainerId,
    ) -> Result<bool, HostError> {
        Ok(props.contains_key("autofocus"))
    }

    fn prepare_update(
        &mut self,
        _instance: InstanceId,
        _ty: &str,
        old_props: &Props,
        new_props: &Props,
        _container: ContainerId,
        _context: &Self::HostContext,
    ) -> Result<Option<PropDiff>, HostError> {
        let mut diff: PropDiff = Vec::new();
        for (key, _) in old_props.iter() {
            if !new_props.contains_key(key) {
                diff.push((key.clone(), None));
            }
        }
        for (key, value) in new_props.iter() {
            if old_props.get(key) != Some(value) {
                diff.push((key.clone(), Some(value.clone())));
            }
        }
        Ok(if diff.is_empty() { None } else { Some(diff) })
    }

    fn commit_update(
        &mut self,
        instance: InstanceId,
        payload: &PropDiff,
        _ty: &str,
        _old_props: &Props,
        new_props: &Props,
    ) -> Result<(), HostError> {
        // The diff and the new props must describe the same end state.
        for (key, value) in payload {
            if new_props.get(key.as_str()) != value.as_ref() {
                return Err(HostError(format!(
                    "diff entry for `{key}` disagrees with new props"
                )));
            }
        }
        let node = self
            .nodes
            .get_mut(&instance)
            .ok_or_else(|| HostError("update on unknown instance".into()))?;
        for (key, value) in payload {
            match value {
                Some(value) => {
                    node.props.insert(key.clone(), value.clone());
                }
                None => {
                    node.props.remove(key);
                }
            }
        }
        self.ops.push(HostOp::CommitUpdate {
            id: instance,
            diff: payload.clone(),
        });
        Ok(())
    }

    fn commit_text_update(
        &mut self,
        instance: InstanceId,
        old_text: &str,
        new_text: &str,
    ) -> Result<(), HostError> {
        if let Some(node) = self.nodes.get_mut(&instance) {
            node.text = Some(new_text.to_string());
        }
        self.ops.push(HostOp::CommitTextUpdate {
            id: instance,
            old: old_text.to_string(),
            new: new_text.to_string(),
        });
        Ok(())
    }

    fn commit_mount(
        &mut self,
        instance: InstanceId,
        _ty: &str,
        _props: &Props,
    ) -> Result<(), HostError> {
        self.ops.push(HostOp::CommitMount { id: instance });
        Ok(())
    }

    fn reset_text_content(&mut self, instance: InstanceId) -> Result<(), HostError> {
        if let Some(node) = self.nodes.get_mut(&instance) {
            node.text = None;
        }
        self.ops.push(HostOp::ResetTextContent { id: instance });
        Ok(())
    }

    fn append_child(&mut self, parent: HostParent, child: InstanceId) -> Result<(), HostError> {
        self.detach(child);
        self.children_mut(parent).push(child);
        self.ops.push(HostOp::AppendChild { parent, child });
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: HostParent,
        child: InstanceId,
        before: InstanceId,
    ) -> Result<(), HostError> {
        self.detach(child);
        let children = self.children_mut(parent);
        let index = children
            .iter()
            .position(|c| *c == before)
            .ok_or_else(|| HostError("insert_before anchor not under parent".into()))?;
        children.insert(index, child);
        self.ops.push(HostOp::InsertBefore {
            parent,
            child,
            before,
        });
        Ok(())
    }

    fn remove_child(&mut self, parent: HostParent, child: InstanceId) -> Result<(), HostError> {
        self.children_mut(parent).retain(|c| *c != child);
        self.nodes.remove(&child);
        self.ops.push(HostOp::RemoveChild { parent, child });
        Ok(())
    }

    fn schedule_animation_callback(&mut self) {
        self.animation_requests += 1;
    }

    fn schedule_deferred_callback(&mut self) {
        self.deferred_requests += 1;
    }
}
