use crate::axes::{AxisSet, AxisSpec, Role};
use crate::graph::Graph;

/// Create new anonymous axes with the given lengths.
pub fn fresh_axes(graph: &mut Graph, lengths: &[usize]) -> AxisSet {
    let ids: Vec<_> = lengths
        .iter()
        .map(|&len| {
            graph
                .axes_mut()
                .make_axis(AxisSpec::new().length(len))
                .unwrap()
        })
        .collect();
    AxisSet::new(ids).unwrap()
}

/// Create new axes with unresolved lengths and one role each.
pub fn role_axes(graph: &mut Graph, roles: &[Role]) -> AxisSet {
    let ids: Vec<_> = roles
        .iter()
        .map(|&role| {
            let spec = if role == Role::Batch {
                AxisSpec::new().batch()
            } else {
                AxisSpec::new().role(role)
            };
            graph.axes_mut().make_axis(spec).unwrap()
        })
        .collect();
    AxisSet::new(ids).unwrap()
}
