//! Heap occupancy reporting.
//!
//! Human-readable summaries of what went into the heap, grouped by class per
//! partition. Enabled via `BuildOptions::print_heap_histogram` and
//! `print_partition_sizes`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::heap::ImageHeap;
use crate::partition::PartitionKind;

/// Per-class count/size rows for every partition, largest first.
pub fn render_histogram(heap: &ImageHeap) -> String {
    let mut out = String::new();
    for kind in PartitionKind::ALL {
        let mut rows: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
        for info in heap.objects() {
            if info.partition() == Some(kind) {
                let name = heap.universe().ty(info.class()).name.as_str();
                let row = rows.entry(name).or_insert((0, 0));
                row.0 += 1;
                row.1 += info.size();
            }
        }
        let partition = heap.partition(kind);
        let _ = writeln!(
            out,
            "=== partition: {}  count: {}  size: {} ===",
            kind.name(),
            partition.count(),
            partition.size()
        );

        let mut sorted: Vec<_> = rows.into_iter().collect();
        sorted.sort_by(|a, b| b.1.1.cmp(&a.1.1).then(a.0.cmp(b.0)));
        for (name, (count, size)) in sorted {
            let _ = writeln!(out, "{count:>8} {size:>12}  {name}");
        }
    }
    out
}

/// One line per partition with its total size (padding included).
pub fn render_partition_sizes(heap: &ImageHeap) -> String {
    let mut out = String::new();
    for kind in PartitionKind::ALL {
        let _ = writeln!(
            out,
            "partition: {}  size: {}",
            kind.name(),
            heap.partition(kind).size()
        );
    }
    out
}
