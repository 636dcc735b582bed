// ===============================
// src/inventory.rs
// ===============================
//
// Bagi total tiket ke vendor secara round-robin: tiket ke-i milik vendor
// (i % vendor_count). Hasilnya setiap slice berukuran floor(total/count)
// atau +1, dan sisa pembagian jatuh ke vendor paling awal.
//
use std::collections::VecDeque;

use crate::domain::{ticket_label, vendor_label, Ticket};

/// Per-vendor slices, index = vendor index. Front of each slice = next ticket
/// to release (ascending ticket id).
pub fn partition(total_tickets: usize, vendor_count: usize) -> Vec<VecDeque<Ticket>> {
    if vendor_count == 0 {
        return Vec::new();
    }
    let mut slices: Vec<VecDeque<Ticket>> = (0..vendor_count).map(|_| VecDeque::new()).collect();
    for i in 0..total_tickets {
        let v = i % vendor_count;
        slices[v].push_back(Ticket { id: ticket_label(i + 1), vendor_id: vendor_label(v) });
    }
    slices
}
