//! 1-D tolerance clustering, shared by flow-row detection and decision-row
//! voting: greedy nearest-center grouping of scalar values.

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub center: f64,
    /// Indices into the input slice, in input order.
    pub members: Vec<usize>,
}

/// Cluster values whose centers differ by less than `tolerance`.
///
/// Values are assigned greedily to the nearest existing cluster when within
/// tolerance of its running mean, otherwise they seed a new cluster.
/// Clusters are returned sorted by center, descending (top row first in
/// Y-up page space).
pub fn cluster_values(values: &[f64], tolerance: f64) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();

    // Assign in descending value order so running means drift predictably.
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

    for idx in order {
        let value = values[idx];
        let nearest = clusters
            .iter_mut()
            .min_by(|a, b| (a.center - value).abs().total_cmp(&(b.center - value).abs()));
        match nearest {
            Some(cluster) if (cluster.center - value).abs() < tolerance => {
                let n = cluster.members.len() as f64;
                cluster.center = (cluster.center * n + value) / (n + 1.0);
                cluster.members.push(idx);
            }
            _ => clusters.push(Cluster {
                center: value,
                members: vec![idx],
            }),
        }
    }

    for cluster in &mut clusters {
        cluster.members.sort_unstable();
    }
    clusters.sort_by(|a, b| b.center.total_cmp(&a.center));
    clusters
}

/// Index of the cluster whose center is nearest to `value`.
pub fn nearest_cluster(clusters: &[Cluster], value: f64) -> Option<usize> {
    clusters
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a.center - value).abs().total_cmp(&(b.center - value).abs()))
        .map(|(i, _)| i)
}
