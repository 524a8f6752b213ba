use std::path::Path;
use training::{checkpoint_path, BestCheckpoint};

#[test]
fn best_epoch_tracks_strict_improvements() {
    let mut best = BestCheckpoint::new();
    let improved: Vec<bool> = [5.0, 3.0, 4.0, 1.0]
        .into_iter()
        .enumerate()
        .map(|(epoch, loss)| best.observe(epoch, loss))
        .collect();
    assert_eq!(improved, vec![true, true, false, true]);
    assert_eq!(best.best_epoch(), 3);
    assert_eq!(best.min_valid_loss(), Some(1.0));
}

#[test]
fn equal_loss_keeps_earlier_epoch() {
    let mut best = BestCheckpoint::new();
    assert_eq!(best.min_valid_loss(), None);
    assert!(best.observe(0, 2.0));
    assert!(!best.observe(1, 2.0));
    assert_eq!(best.best_epoch(), 0);
}

#[test]
fn checkpoint_names_follow_epoch_pattern() {
    let path = checkpoint_path(Path::new("runs/ckpt"), "UBFC_PulseNet", 12);
    assert_eq!(path, Path::new("runs/ckpt/UBFC_PulseNet_Epoch12.bin"));
}
