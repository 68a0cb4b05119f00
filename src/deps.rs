//! Call-graph attribute propagation.
//!
//! External functions and kernels inherit attributes from the functions they
//! call: the barrier count is the maximum across the call graph, and the
//! printf/indirect-call/raytracing flags are OR-ed bottom-up. The graph is
//! externally supplied and may contain cycles, so ordering uses an
//! explicit-stack DFS that visits every node exactly once.

use std::collections::HashMap;

use crate::error::ExternalFunctionResolveError;
use crate::linker_input::{FunctionDependency, KernelDependency};
use crate::program::{ExternalFunctionInfo, KernelInfo};

pub type NodeId = usize;

/// Returns the nodes of `adjacency` in reverse postorder: every callee is
/// emitted at or before its callers, except inside a cycle, where the node
/// closing the cycle is emitted where it was first reached.
pub fn resolve(adjacency: &[Vec<NodeId>]) -> Vec<NodeId> {
    let node_count = adjacency.len();
    let mut seen = vec![false; node_count];
    let mut resolved = Vec::with_capacity(node_count);
    for root in 0..node_count {
        if seen[root] {
            continue;
        }
        seen[root] = true;
        // (node, index of the next edge to follow)
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
        while let Some((node, edge)) = stack.last_mut() {
            let node = *node;
            if *edge < adjacency[node].len() {
                let next = adjacency[node][*edge];
                *edge += 1;
                if next < node_count && !seen[next] {
                    seen[next] = true;
                    stack.push((next, 0));
                }
            } else {
                resolved.push(node);
                stack.pop();
            }
        }
    }
    resolved
}

fn merge_into_function(target: &mut ExternalFunctionInfo, callee: &ExternalFunctionInfo) {
    target.barrier_count = target.barrier_count.max(callee.barrier_count);
    target.has_rt_calls |= callee.has_rt_calls;
    target.uses_printf |= callee.uses_printf;
    target.has_indirect_calls |= callee.has_indirect_calls;
}

/// Propagates callee attributes through the function→function edges, then
/// applies the kernel→function edges onto the kernel descriptors.
///
/// A dependency naming an unknown function or kernel is a hard error unless
/// it is marked optional, in which case it is silently skipped.
pub fn resolve_external_dependencies(
    external_functions: &mut [ExternalFunctionInfo],
    kernel_dependencies: &[KernelDependency],
    function_dependencies: &[FunctionDependency],
    kernels: &mut [KernelInfo<'_>],
) -> Result<(), ExternalFunctionResolveError> {
    let function_ids: HashMap<String, usize> = external_functions
        .iter()
        .enumerate()
        .map(|(id, f)| (f.function_name.clone(), id))
        .collect();

    let mut adjacency = vec![Vec::new(); external_functions.len()];
    let mut edges: Vec<(usize, usize)> = Vec::new();
    for dependency in function_dependencies {
        let callee = function_ids.get(dependency.callee.as_str());
        let caller = function_ids.get(dependency.caller.as_str());
        match (caller, callee) {
            (Some(&caller), Some(&callee)) => {
                adjacency[caller].push(callee);
                edges.push((caller, callee));
            }
            _ if dependency.optional => continue,
            _ => return Err(ExternalFunctionResolveError::ExternalFunctionInfoMissing),
        }
    }

    // Callees come first in the resolved order, so walking it caller-side
    // sees fully propagated callee attributes.
    for node in resolve(&adjacency) {
        for &(caller, callee) in edges.iter().filter(|(caller, _)| *caller == node) {
            let merged = external_functions[callee].clone();
            merge_into_function(&mut external_functions[caller], &merged);
        }
    }

    for dependency in kernel_dependencies {
        let Some(&callee) = function_ids.get(dependency.callee.as_str()) else {
            if dependency.optional {
                continue;
            }
            return Err(ExternalFunctionResolveError::ExternalFunctionInfoMissing);
        };
        let Some(kernel) = kernels
            .iter_mut()
            .find(|k| k.descriptor.metadata.kernel_name == dependency.kernel_name)
        else {
            if dependency.optional {
                continue;
            }
            return Err(ExternalFunctionResolveError::KernelDescriptorMissing);
        };
        let callee = &external_functions[callee];
        let attrs = &mut kernel.descriptor.attributes;
        attrs.barrier_count = attrs.barrier_count.max(callee.barrier_count);
        attrs.flags.has_rt_calls |= callee.has_rt_calls;
        attrs.flags.uses_printf |= callee.uses_printf;
        attrs.flags.has_indirect_calls |= callee.has_indirect_calls;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(name: &str, barriers: u32) -> ExternalFunctionInfo {
        ExternalFunctionInfo {
            function_name: name.to_string(),
            barrier_count: barriers,
            simd_size: 8,
            num_grf_required: 128,
            ..Default::default()
        }
    }

    fn kernel(name: &str) -> KernelInfo<'static> {
        let mut k = KernelInfo::default();
        k.descriptor.metadata.kernel_name = name.to_string();
        k
    }

    fn fn_dep(caller: &str, callee: &str) -> FunctionDependency {
        FunctionDependency {
            caller: caller.to_string(),
            callee: callee.to_string(),
            optional: false,
        }
    }

    fn kernel_dep(kernel: &str, callee: &str) -> KernelDependency {
        KernelDependency {
            kernel_name: kernel.to_string(),
            callee: callee.to_string(),
            optional: false,
        }
    }

    #[test]
    fn emits_every_node_once_with_callees_first() {
        // 0 → {1, 2}, 1 → 3, 2 → 3
        let adjacency = vec![vec![1, 2], vec![3], vec![3], vec![]];
        let order = resolve(&adjacency);
        assert_eq!(order.len(), 4);
        let position = |n: usize| order.iter().position(|&x| x == n).unwrap();
        for (caller, callees) in adjacency.iter().enumerate() {
            for &callee in callees {
                assert!(position(callee) <= position(caller), "{callee} after {caller}");
            }
        }
    }

    #[test]
    fn four_cycle_resolves_in_discovery_order() {
        let adjacency = vec![vec![1], vec![2], vec![3], vec![0]];
        assert_eq!(resolve(&adjacency), vec![3, 2, 1, 0]);
    }

    #[test]
    fn self_loop_and_disconnected_nodes_terminate() {
        let adjacency = vec![vec![0], vec![], vec![1]];
        let order = resolve(&adjacency);
        assert_eq!(order.len(), 3);
        assert!(order.contains(&0) && order.contains(&1) && order.contains(&2));
    }

    #[test]
    fn deep_chain_does_not_overflow_the_stack() {
        let n = 200_000;
        let adjacency: Vec<Vec<usize>> = (0..n)
            .map(|i| if i + 1 < n { vec![i + 1] } else { vec![] })
            .collect();
        let order = resolve(&adjacency);
        assert_eq!(order.len(), n);
        assert_eq!(order[0], n - 1);
    }

    #[test]
    fn attributes_propagate_through_call_chains() {
        // kernel → a → b → c; c uses printf and 4 barriers.
        let mut functions = vec![function("a", 0), function("b", 1), {
            let mut c = function("c", 4);
            c.uses_printf = true;
            c.has_rt_calls = true;
            c
        }];
        let mut kernels = vec![kernel("main")];
        resolve_external_dependencies(
            &mut functions,
            &[kernel_dep("main", "a")],
            &[fn_dep("a", "b"), fn_dep("b", "c")],
            &mut kernels,
        )
        .unwrap();

        assert_eq!(functions[0].barrier_count, 4);
        assert!(functions[0].uses_printf);
        assert!(functions[0].has_rt_calls);
        assert_eq!(functions[1].barrier_count, 4);

        let attrs = &kernels[0].descriptor.attributes;
        assert_eq!(attrs.barrier_count, 4);
        assert!(attrs.flags.uses_printf);
        assert!(attrs.flags.has_rt_calls);
    }

    #[test]
    fn cyclic_function_dependencies_still_terminate() {
        let mut functions = vec![function("a", 1), function("b", 2)];
        let mut kernels = vec![kernel("main")];
        resolve_external_dependencies(
            &mut functions,
            &[kernel_dep("main", "a")],
            &[fn_dep("a", "b"), fn_dep("b", "a")],
            &mut kernels,
        )
        .unwrap();
        assert_eq!(functions[0].barrier_count, 2);
        assert_eq!(kernels[0].descriptor.attributes.barrier_count, 2);
    }

    #[test]
    fn missing_function_is_a_hard_error() {
        let mut functions = vec![function("a", 0)];
        let mut kernels = vec![kernel("main")];
        let err = resolve_external_dependencies(
            &mut functions,
            &[kernel_dep("main", "ghost")],
            &[],
            &mut kernels,
        )
        .unwrap_err();
        assert_eq!(err, ExternalFunctionResolveError::ExternalFunctionInfoMissing);

        let err = resolve_external_dependencies(
            &mut functions,
            &[],
            &[fn_dep("a", "ghost")],
            &mut kernels,
        )
        .unwrap_err();
        assert_eq!(err, ExternalFunctionResolveError::ExternalFunctionInfoMissing);
    }

    #[test]
    fn missing_kernel_is_a_kernel_descriptor_error() {
        let mut functions = vec![function("a", 0)];
        let mut kernels = vec![kernel("main")];
        let err = resolve_external_dependencies(
            &mut functions,
            &[kernel_dep("ghost", "a")],
            &[],
            &mut kernels,
        )
        .unwrap_err();
        assert_eq!(err, ExternalFunctionResolveError::KernelDescriptorMissing);
    }

    #[test]
    fn optional_dependencies_are_skipped_silently() {
        let mut functions = vec![function("a", 0)];
        let mut kernels = vec![kernel("main")];
        resolve_external_dependencies(
            &mut functions,
            &[KernelDependency {
                kernel_name: "main".to_string(),
                callee: "ghost".to_string(),
                optional: true,
            }],
            &[FunctionDependency {
                caller: "a".to_string(),
                callee: "ghost".to_string(),
                optional: true,
            }],
            &mut kernels,
        )
        .unwrap();
        assert_eq!(kernels[0].descriptor.attributes.barrier_count, 0);
    }
}
