use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use anyhow::Result;

use bindle::{
    ContextBuilder, DescriptorTable, DrainReport, Epoch, FrameEpochCoordinator, GpuTimeline, HostTimeline,
    Retired, SlotState,
};

mod framework;

#[test]
pub fn deferred_release_waits_for_slot_to_cycle() -> Result<()> {
    let (mut frames, timeline) = framework::make_coordinator(3)?;
    let table = DescriptorTable::new("scenario c", 4)?;

    let slot = frames.begin_frame();
    assert_eq!(slot.index(), 0);
    let index = table.allocate();
    frames.retirer().release_index(&table, index);
    frames.end_frame(slot, ());
    assert_eq!(frames.last_epoch(slot), Epoch::new(1));

    // Slots 1 and 2 have never been used, so beginning them never waits.
    let slot = frames.begin_frame();
    assert_eq!(slot.index(), 1);
    assert!(table.is_allocated(index), "Released index should not be reusable after one frame");
    frames.end_frame(slot, ());

    let slot = frames.begin_frame();
    assert_eq!(slot.index(), 2);
    assert!(table.is_allocated(index), "Released index should not be reusable after two frames");
    frames.end_frame(slot, ());

    timeline.signal(Epoch::new(1))?;
    let slot = frames.begin_frame();
    assert_eq!(slot.index(), 0);
    assert!(!table.is_allocated(index), "Released index should be free once slot 0 is reached again");
    assert_eq!(table.allocate(), index, "The only free index should be handed out again");
    frames.end_frame(slot, ());

    timeline.signal_all()?;
    frames.wait_for_all();
    unsafe { table.release_immediate(index) };
    Ok(())
}

#[test]
pub fn release_lands_in_slot_of_recording_frame() -> Result<()> {
    let (mut frames, timeline) = framework::make_coordinator(2)?;
    let table = DescriptorTable::new("slots", 8)?;
    let retirer = frames.retirer().clone();

    for frame in 0..6usize {
        let slot = frames.begin_frame();
        assert_eq!(slot.index(), frame % 2);
        assert_eq!(retirer.current_slot(), slot.index());
        assert_eq!(frames.slot_state(slot), SlotState::Recording);
        assert_eq!(frames.current_slot(), Some(slot));

        let index = table.allocate();
        retirer.release_index(&table, index);
        assert_eq!(frames.pending_count(slot), 1);

        frames.end_frame(slot, ());
        assert_eq!(frames.slot_state(slot), SlotState::Submitted);
        // Completes every frame right away, so each index lives exactly one frame cycle.
        timeline.signal_all()?;
    }
    // The last two frames still hold one index each.
    assert_eq!(table.live_count(), 2);
    assert_eq!(frames.frame_count(), 6);
    assert_eq!(frames.latest_epoch(), Epoch::new(6));

    let report = frames.wait_for_all();
    assert_eq!(report, DrainReport { indices: 2, handles: 0 });
    assert_eq!(table.live_count(), 0);
    Ok(())
}

#[test]
pub fn begin_frame_blocks_until_epoch_signaled() -> Result<()> {
    framework::init_logging();
    let timeline = HostTimeline::new();
    let settings = ContextBuilder::new()
        .frames_in_flight(1)
        .wait_timeout(Duration::from_secs(10))
        .build();
    let mut frames = FrameEpochCoordinator::new(timeline.clone(), &settings)?;
    let table = DescriptorTable::new("blocking", 1)?;

    let slot = frames.begin_frame();
    let index = table.allocate();
    frames.retirer().release_index(&table, index);
    frames.end_frame(slot, ());

    let gpu = thread::spawn({
        let timeline = timeline.clone();
        move || {
            thread::sleep(Duration::from_millis(50));
            timeline.signal(Epoch::new(1))
        }
    });
    // Single slot: this waits on epoch 1, which the other thread signals.
    let slot = frames.begin_frame();
    assert!(timeline.completed()? >= Epoch::new(1));
    assert!(!table.is_allocated(index));
    frames.end_frame(slot, ());

    gpu.join().expect("signalling thread should not panic")?;
    timeline.signal_all()?;
    frames.wait_for_all();
    Ok(())
}

#[test]
#[should_panic(expected = "Device lost")]
pub fn wait_timeout_is_fatal() {
    let (mut frames, _timeline) = framework::make_coordinator(1).unwrap();
    let slot = frames.begin_frame();
    frames.end_frame(slot, ());
    // Epoch 1 is never signalled.
    frames.begin_frame();
}

#[test]
#[should_panic(expected = "Frame out of order")]
pub fn nested_begin_frame_panics() {
    let (mut frames, _timeline) = framework::make_coordinator(2).unwrap();
    frames.begin_frame();
    frames.begin_frame();
}

#[test]
#[should_panic(expected = "Frame out of order")]
pub fn end_frame_with_wrong_slot_panics() {
    let (mut frames, timeline) = framework::make_coordinator(2).unwrap();
    let first = frames.begin_frame();
    frames.end_frame(first, ());
    timeline.signal_all().unwrap();
    frames.begin_frame();
    frames.end_frame(first, ());
}

#[test]
pub fn immediate_release_is_deferred_while_gpu_busy() -> Result<()> {
    let (mut frames, timeline) = framework::make_coordinator(2)?;
    let table = DescriptorTable::new("immediate", 4)?;

    // Nothing submitted yet, so an immediate release is honoured.
    let index = table.allocate();
    frames.release_resource(Retired::default().with_index(owned(&table, index)), false);
    assert!(!table.is_allocated(index));

    let slot = frames.begin_frame();
    frames.end_frame(slot, ());
    assert!(!frames.is_idle());

    // Epoch 1 is in flight, so the request falls back to a deferred release.
    let index = table.allocate();
    frames.release_resource(owned(&table, index), false);
    assert!(table.is_allocated(index));
    assert_eq!(frames.retirer().total_pending(), 1);

    timeline.signal_all()?;
    assert!(frames.is_idle());
    frames.wait_for_all();
    assert!(!table.is_allocated(index));
    Ok(())
}

#[test]
pub fn immediate_release_while_recording_is_deferred() -> Result<()> {
    framework::init_logging();
    // Every epoch completes on submit, so only the recording frame keeps the GPU busy.
    let mut frames = FrameEpochCoordinator::new(HostTimeline::immediate(), &framework::test_settings(2))?;
    let table = DescriptorTable::new("recording", 4)?;

    let slot = frames.begin_frame();
    assert!(!frames.is_idle(), "A recording frame should count as busy");
    let index = table.allocate();
    frames.release_resource(owned(&table, index), false);
    assert!(table.is_allocated(index), "The recording frame may still use the index");
    assert!(table.is_pending(index));
    assert_ne!(table.allocate(), index, "The index must not be reissued within the same frame");
    frames.end_frame(slot, ());

    assert!(frames.is_idle());
    frames.wait_for_all();
    assert!(!table.is_allocated(index));
    assert_eq!(table.live_count(), 1);
    Ok(())
}

#[test]
#[should_panic(expected = "Double free")]
pub fn deferred_release_of_free_index_panics() {
    let (frames, _timeline) = framework::make_coordinator(2).unwrap();
    let table = DescriptorTable::new("never allocated", 4).unwrap();
    frames.retirer().release_index(&table, bindle::DescriptorIndex::new(2));
}

#[test]
#[should_panic(expected = "Double free")]
pub fn deferred_double_release_panics() {
    let (mut frames, timeline) = framework::make_coordinator(2).unwrap();
    let table = DescriptorTable::new("released twice", 1).unwrap();
    let index = table.allocate();

    let slot = frames.begin_frame();
    frames.retirer().release_index(&table, index);
    frames.end_frame(slot, ());
    timeline.signal_all().unwrap();

    // Still pending in slot 0, so this second release must be caught right here.
    let slot = frames.begin_frame();
    assert_eq!(slot.index(), 1);
    frames.retirer().release_index(&table, index);
}

#[test]
pub fn double_release_does_not_reach_any_queue() -> Result<()> {
    let (frames, _timeline) = framework::make_coordinator(2)?;
    let table = DescriptorTable::new("rejected", 2)?;
    let index = table.allocate();
    frames.retirer().release_index(&table, index);

    let retirer = frames.retirer().clone();
    let second = catch_unwind(AssertUnwindSafe(|| retirer.release_index(&table, index)));
    assert!(second.is_err());
    assert_eq!(frames.retirer().total_pending(), 1, "Only the first release should be queued");
    // The retire lock is not poisoned by the rejected release.
    let other = table.allocate();
    frames.retirer().release_index(&table, other);
    assert_eq!(frames.retirer().total_pending(), 2);
    Ok(())
}

#[test]
pub fn release_between_frames_waits_for_submitted_slot() -> Result<()> {
    let (mut frames, timeline) = framework::make_coordinator(3)?;
    let table = DescriptorTable::new("between frames", 4)?;
    let index = table.allocate();

    let slot = frames.begin_frame();
    frames.end_frame(slot, ());
    // No frame is recording: the release lands in slot 0, which was just submitted with epoch 1.
    frames.retirer().release_index(&table, index);
    assert_eq!(frames.pending_count(slot), 1);

    for expected in [1, 2] {
        let slot = frames.begin_frame();
        assert_eq!(slot.index(), expected);
        assert!(table.is_allocated(index), "Released index should survive until slot 0 comes around");
        frames.end_frame(slot, ());
    }

    timeline.signal(Epoch::new(1))?;
    let slot = frames.begin_frame();
    assert_eq!(slot.index(), 0);
    assert!(!table.is_allocated(index), "Released index should be free once epoch 1 completed");
    frames.end_frame(slot, ());

    timeline.signal_all()?;
    frames.wait_for_all();
    Ok(())
}

#[test]
pub fn releases_before_first_frame_drain_on_first_frame() -> Result<()> {
    let (mut frames, _timeline) = framework::make_coordinator(3)?;
    let table = DescriptorTable::new("early", 2)?;
    let index = table.allocate();
    frames.retirer().release_index(&table, index);
    assert_eq!(frames.retirer().current_slot(), 0);

    let slot = frames.begin_frame();
    assert!(!table.is_allocated(index));
    frames.end_frame(slot, ());
    Ok(())
}

#[test]
pub fn retirer_works_from_other_threads() -> Result<()> {
    let (mut frames, timeline) = framework::make_coordinator(2)?;
    let table = DescriptorTable::new("threads", 64)?;

    let slot = frames.begin_frame();
    let workers = (0..4)
        .map(|_| {
            let retirer = frames.retirer().clone();
            let table = table.clone();
            thread::spawn(move || {
                for _ in 0..8 {
                    let index = table.allocate();
                    retirer.release_index(&table, index);
                }
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().expect("worker thread should not panic");
    }
    assert_eq!(frames.pending_count(slot), 32);
    assert_eq!(table.live_count(), 32);
    frames.end_frame(slot, ());

    timeline.signal_all()?;
    let report = frames.wait_for_all();
    assert_eq!(report.indices, 32);
    assert_eq!(table.live_count(), 0);
    Ok(())
}

#[test]
pub fn invalid_settings_are_rejected() {
    let settings = ContextBuilder::new().frames_in_flight(0).build();
    assert!(FrameEpochCoordinator::new(HostTimeline::new(), &settings).is_err());
}

fn owned(table: &DescriptorTable, index: bindle::DescriptorIndex) -> bindle::OwnedIndex {
    bindle::OwnedIndex::Table {
        table: table.clone(),
        index,
    }
}
