//! Loading the same tree collection twice must reproduce the indexer and
//! every scheduled stream exactly.

use anyhow::Result;

use subito::sbn::indexer::SbnIndexer;
use subito::{ladder_topology, SubsplitDag, TopologyBuilder, Tree, TreeCollection};

fn collection() -> Result<TreeCollection> {
    let taxon_names: Vec<String> = (0..6).map(|i| format!("t{i}")).collect();
    let ladder = ladder_topology(6)?;
    let mut builder = TopologyBuilder::new(6);
    let l0 = builder.leaf(0);
    let l1 = builder.leaf(1);
    let l2 = builder.leaf(2);
    let l3 = builder.leaf(3);
    let l4 = builder.leaf(4);
    let l5 = builder.leaf(5);
    let a = builder.join(l0, l1);
    let b = builder.join(l2, l3);
    let c = builder.join(l4, l5);
    let ab = builder.join(a, b);
    let root = builder.join(ab, c);
    let balanced = builder.finish(root)?;
    let trees = vec![
        Tree::with_constant_branch_length(ladder, 0.2),
        Tree::with_constant_branch_length(balanced, 0.1),
    ];
    Ok(TreeCollection::new(taxon_names, trees)?)
}

#[test]
fn indexers_from_identical_input_agree() -> Result<()> {
    let first = SbnIndexer::new(&collection()?.topology_counter())?;
    let second = SbnIndexer::new(&collection()?.topology_counter())?;
    assert!(first.same_support_as(&second));
    assert_eq!(first.rootsplit_count(), second.rootsplit_count());
    assert_eq!(first.gpcsp_count(), second.gpcsp_count());
    assert_eq!(first.rootsplits(), second.rootsplits());
    Ok(())
}

#[test]
fn dags_from_identical_input_emit_identical_streams() -> Result<()> {
    let first = SubsplitDag::new(&collection()?)?;
    let second = SubsplitDag::new(&collection()?)?;
    assert_eq!(first.node_count(), second.node_count());
    assert_eq!(first.parameter_count(), second.parameter_count());
    assert_eq!(first.rootward_order(), second.rootward_order());
    assert_eq!(first.leafward_order(), second.leafward_order());
    assert_eq!(
        first.rootward_pass_ops()?,
        second.rootward_pass_ops()?
    );
    assert_eq!(
        first.leafward_pass_ops()?,
        second.leafward_pass_ops()?
    );
    assert_eq!(
        first.branch_length_optimization_ops()?,
        second.branch_length_optimization_ops()?
    );
    assert_eq!(
        first.sbn_parameter_optimization_ops()?,
        second.sbn_parameter_optimization_ops()?
    );
    assert_eq!(first.likelihood_ops()?, second.likelihood_ops()?);
    Ok(())
}

#[test]
fn observed_edges_map_into_the_parameter_vector() -> Result<()> {
    let collection = collection()?;
    let dag = SubsplitDag::new(&collection)?;
    for tree in collection.trees() {
        // The rootsplit and every edge of every observed tree resolve to
        // distinct in-range parameter slots.
        let mut seen = std::collections::HashSet::new();
        let rootsplit = dag
            .indexer()
            .rootsplit_index(&tree.topology().rootsplit_clade())
            .expect("observed rootsplit is indexed");
        assert!(rootsplit < dag.rootsplit_count());
        seen.insert(rootsplit);
        for edge in tree.topology().rooted_edges() {
            let index = dag
                .pcsp_parameter_index(&edge.pcsp())
                .expect("observed edge is indexed");
            assert!(index >= dag.rootsplit_count());
            assert!(index < dag.parameter_count());
            assert!(seen.insert(index), "edge parameter {index} repeated");
        }
    }
    Ok(())
}
