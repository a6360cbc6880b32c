use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use xflow_dom::{Document, NodeId};
use xflow_engine::{ContextLabel, ContextStack};

fn document_with_nodes(count: usize) -> (Document, Vec<NodeId>) {
    let mut doc = Document::new("root");
    let root = doc.root();
    let nodes = (0..count).map(|i| doc.add_element(root, format!("n{i}"))).collect();
    (doc, nodes)
}

fn apply_frames(ctx: &mut ContextStack, frames: &[Vec<(usize, usize)>], nodes: &[NodeId]) {
    let Some((first, rest)) = frames.split_first() else {
        return;
    };
    let mut local = ctx.localise("nested");
    for (label, node) in first {
        local.set(ContextLabel::ALL[*label], nodes[*node]);
    }
    apply_frames(&mut local, rest, nodes);
}

#[test]
fn panic_inside_frame_restores_context() {
    let (doc, nodes) = document_with_nodes(2);
    let mut ctx = ContextStack::with_root(doc.root());
    ctx.set(ContextLabel::Item, nodes[0]);
    let before = ctx.snapshot();

    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut local = ctx.localise("panicking");
        local.set(ContextLabel::Item, nodes[1]);
        local.set(ContextLabel::Action, nodes[1]);
        panic!("evaluation failed");
    }));

    assert!(result.is_err());
    assert_eq!(ctx.snapshot(), before);
    assert_eq!(ctx.depth(), 0);
}

#[test]
fn with_localised_returns_closure_value() {
    let (doc, nodes) = document_with_nodes(1);
    let mut ctx = ContextStack::with_root(doc.root());

    let seen = ctx.with_localised("lookup", |local| {
        local.set(ContextLabel::Attach, nodes[0]);
        local.get(ContextLabel::Attach)
    });

    assert_eq!(seen, Some(nodes[0]));
    assert_eq!(ctx.get(ContextLabel::Attach), Some(doc.root()));
}

proptest! {
    #[test]
    fn prop_closed_frames_restore_initial_context(
        initial in prop::collection::vec((0usize..4, 0usize..6), 0..4),
        frames in prop::collection::vec(
            prop::collection::vec((0usize..4, 0usize..6), 0..5),
            0..6,
        ),
    ) {
        let (doc, nodes) = document_with_nodes(6);
        let mut ctx = ContextStack::with_root(doc.root());
        for (label, node) in &initial {
            ctx.set(ContextLabel::ALL[*label], nodes[*node]);
        }
        let before = ctx.snapshot();

        apply_frames(&mut ctx, &frames, &nodes);

        prop_assert_eq!(ctx.snapshot(), before);
        prop_assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn prop_panicking_frames_restore_initial_context(
        frames in prop::collection::vec(
            prop::collection::vec((0usize..4, 0usize..6), 1..4),
            1..4,
        ),
    ) {
        let (doc, nodes) = document_with_nodes(6);
        let mut ctx = ContextStack::with_root(doc.root());
        let before = ctx.snapshot();

        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut local = ctx.localise("outer");
            apply_frames(&mut local, &frames, &nodes);
            local.set(ContextLabel::Item, nodes[0]);
            panic!("failure after nested frames");
        }));

        prop_assert!(result.is_err());
        prop_assert_eq!(ctx.snapshot(), before);
        prop_assert_eq!(ctx.depth(), 0);
    }
}
