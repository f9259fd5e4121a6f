use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use pretty_assertions::assert_eq;
use sweep_engine::{
    merge_ticks, mutation_ticks, poll_ticks, watch, ChangeTicks, Cue, CueError, CuePlayer,
    CueQueue, TransitionDetector,
};
use tokio::time::Instant;

#[derive(Clone, Default)]
struct RecordingPlayer {
    played: Arc<Mutex<Vec<(Cue, Instant)>>>,
    duration: Duration,
}

#[async_trait]
impl CuePlayer for RecordingPlayer {
    async fn play(&self, cue: Cue) -> Result<(), CueError> {
        let started = Instant::now();
        tokio::time::sleep(self.duration).await;
        self.played.lock().unwrap().push((cue, started));
        Ok(())
    }
}

impl RecordingPlayer {
    fn cues(&self) -> Vec<Cue> {
        self.played.lock().unwrap().iter().map(|(cue, _)| *cue).collect()
    }
}

fn ticks(n: usize) -> ChangeTicks {
    Box::pin(stream::iter(std::iter::repeat(()).take(n)))
}

#[tokio::test(start_paused = true)]
async fn burst_of_identical_transitions_emits_once() {
    let player = RecordingPlayer::default();
    let (queue, drain) = CueQueue::spawn(player.clone(), Duration::from_millis(500));

    let mut count = 0;
    // Baseline sample, then five raises inside one debounce window.
    watch(
        ticks(6),
        move || {
            let current = count;
            count += 1;
            current
        },
        TransitionDetector::new(Duration::from_secs(1)),
        &queue,
    )
    .await
    .unwrap();

    drop(queue);
    drain.await.unwrap();
    assert_eq!(player.cues(), vec![Cue::HandRaised]);
}

#[tokio::test(start_paused = true)]
async fn queue_plays_in_order_with_gap() {
    let player = RecordingPlayer {
        duration: Duration::from_millis(100),
        ..RecordingPlayer::default()
    };
    let gap = Duration::from_millis(500);
    let (queue, drain) = CueQueue::spawn(player.clone(), gap);

    queue.push(Cue::HandRaised).unwrap();
    queue.push(Cue::HandLowered).unwrap();
    queue.push(Cue::HandRaised).unwrap();
    drop(queue);
    drain.await.unwrap();

    let played = player.played.lock().unwrap().clone();
    let cues: Vec<Cue> = played.iter().map(|(cue, _)| *cue).collect();
    assert_eq!(cues, vec![Cue::HandRaised, Cue::HandLowered, Cue::HandRaised]);
    for pair in played.windows(2) {
        // Each cue starts only after the previous one finished plus the gap.
        assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(100) + gap);
    }
}

#[tokio::test(start_paused = true)]
async fn disabled_queue_drops_cues() {
    let player = RecordingPlayer::default();
    let (queue, drain) = CueQueue::spawn(player.clone(), Duration::ZERO);

    queue.set_enabled(false);
    queue.push(Cue::HandRaised).unwrap();
    queue.set_enabled(true);
    queue.push(Cue::HandLowered).unwrap();
    drop(queue);
    drain.await.unwrap();

    assert_eq!(player.cues(), vec![Cue::HandLowered]);
}

#[tokio::test(start_paused = true)]
async fn mutation_feed_and_poll_merge() {
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    tx.send(()).await.unwrap();
    tx.send(()).await.unwrap();
    drop(tx);

    let mut merged = merge_ticks(mutation_ticks(rx), poll_ticks(Duration::from_secs(60)));
    let mut seen = 0;
    while seen < 3 {
        merged.next().await.unwrap();
        seen += 1;
    }
    assert_eq!(seen, 3);
}

#[tokio::test]
async fn closed_queue_reports_error() {
    let (queue, drain) = CueQueue::spawn(RecordingPlayer::default(), Duration::ZERO);
    drain.abort();
    let _ = drain.await;
    assert_eq!(queue.push(Cue::HandRaised), Err(CueError::Closed));
}
