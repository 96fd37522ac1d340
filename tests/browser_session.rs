mod common;

use std::time::Duration;

use common::{harness, m3u_body, test_sync_config, Harness};
use playlist_sync::{
    ingestor::SyncOutcome,
    models::{CountryPreference, Playlist},
    repositories::ChannelStore,
    services::{BrowserSession, BrowserView, FallbackDecision, PlaybackEvent, PlaybackSignal},
    utils::url::INTERNAL_SAMPLE_URL,
};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

const SAB_SOURCE_1: &str = "https://tv.bdixtv24.com/toffee/live.php?e=.m3u8&id=b7167fe646a4";
const SAB_SOURCE_2: &str = "https://nxtlive.net/sliv/stream.php?id=0897678986&e=.m3u8";
const BIG_BUCK_BUNNY: &str =
    "http://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4";

async fn session(h: &Harness) -> (BrowserSession, mpsc::Receiver<PlaybackEvent>) {
    BrowserSession::new(
        h.orchestrator.clone(),
        h.preferences.clone(),
        h.db.playlist_locks(),
        &test_sync_config(),
    )
    .await
    .unwrap()
}

async fn wait_for_view(
    view: &mut watch::Receiver<BrowserView>,
    ready: impl FnMut(&BrowserView) -> bool,
) -> BrowserView {
    timeout(Duration::from_secs(5), view.wait_for(ready))
        .await
        .expect("view was not refreshed")
        .unwrap()
        .clone()
}

/// Harness with the built-in sample selected and synced
async fn sample_harness() -> (Harness, Playlist) {
    let h = harness().await;
    let sample = h.add_playlist("Built-in Samples", INTERNAL_SAMPLE_URL).await;
    let (selected, ticket) = h.orchestrator.select_and_sync(sample.id).await.unwrap();
    ticket.unwrap().wait().await;
    (h, selected)
}

#[tokio::test]
async fn test_fallback_walks_alternatives_then_gives_up() {
    let (h, _) = sample_harness().await;
    let (session, mut events) = session(&h).await;
    let playback = session.watch_playback_url();

    let sab = h.channels.get_by_url(SAB_SOURCE_1).await.unwrap().unwrap();
    session.select_channel(&sab).await.unwrap();
    assert_eq!(playback.borrow().as_deref(), Some(SAB_SOURCE_1));

    let decision = session
        .on_playback_signal(PlaybackSignal::Error)
        .await
        .unwrap();
    match decision {
        FallbackDecision::Retry(next) => {
            assert_eq!(next.stream_url, SAB_SOURCE_2);
            assert_eq!(next.name, "Sony SAB HD (Source 2)");
        }
        other => panic!("expected a retry, got {:?}", other),
    }
    assert_eq!(playback.borrow().as_deref(), Some(SAB_SOURCE_2));

    // The alternative fails too; the queue is not rebuilt from it
    let decision = session
        .on_playback_signal(PlaybackSignal::Error)
        .await
        .unwrap();
    assert_eq!(decision, FallbackDecision::Exhausted);
    assert_eq!(*playback.borrow(), None);

    assert_eq!(
        events.try_recv().unwrap(),
        PlaybackEvent::Play {
            url: SAB_SOURCE_2.to_string(),
            name: "Sony SAB HD (Source 2)".to_string()
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        PlaybackEvent::Failed {
            name: "Sony SAB HD (Source 2)".to_string()
        }
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_channel_without_alternatives_is_exhausted_at_once() {
    let (h, _) = sample_harness().await;
    let (session, _events) = session(&h).await;

    let decision = session
        .report_playback_failure("Big Buck Bunny (Test Stream)", BIG_BUCK_BUNNY)
        .await;
    assert_eq!(decision, FallbackDecision::Exhausted);
}

#[tokio::test]
async fn test_selecting_a_channel_starts_a_new_fallback_episode() {
    let (h, _) = sample_harness().await;
    let (session, _events) = session(&h).await;
    let sab = h.channels.get_by_url(SAB_SOURCE_1).await.unwrap().unwrap();

    session.select_channel(&sab).await.unwrap();
    session.report_playback_failure(&sab.name, SAB_SOURCE_1).await;
    session.report_playback_failure(&sab.name, SAB_SOURCE_2).await;

    session.select_channel(&sab).await.unwrap();
    let decision = session.report_playback_failure(&sab.name, SAB_SOURCE_1).await;
    assert!(matches!(decision, FallbackDecision::Retry(_)));
}

#[tokio::test]
async fn test_non_error_signals_do_not_fall_back() {
    let (h, _) = sample_harness().await;
    let (session, _events) = session(&h).await;

    assert!(session
        .on_playback_signal(PlaybackSignal::Error)
        .await
        .is_none());
    for signal in [
        PlaybackSignal::Buffering,
        PlaybackSignal::Ready,
        PlaybackSignal::Ended,
    ] {
        assert!(session.on_playback_signal(signal).await.is_none());
    }
}

#[tokio::test]
async fn test_filters_drive_channel_and_category_lists() {
    let (h, _) = sample_harness().await;
    let (session, _events) = session(&h).await;

    assert_eq!(session.channel_page(0).await.unwrap().len(), 7);
    assert_eq!(
        session.categories().await.unwrap(),
        vec!["News", "Entertainment", "Test"]
    );
    assert_eq!(session.countries().await.unwrap(), vec!["IN"]);

    session.set_country(Some("in")).await.unwrap();
    assert_eq!(session.filters().effective_country().as_deref(), Some("IN"));
    assert_eq!(session.channel_page(0).await.unwrap().len(), 5);
    assert_eq!(
        session.categories().await.unwrap(),
        vec!["News", "Entertainment"]
    );

    session.set_category(Some("News".to_string()));
    let news = session.channel_page(0).await.unwrap();
    assert_eq!(news.len(), 2);
    assert!(news.iter().all(|c| c.category == "News"));

    // Search ignores the category and country filters
    session.set_search_query("sintel");
    let found = session.channel_page(0).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Sintel (Test Stream)");
}

#[tokio::test]
async fn test_detected_country_applies_only_when_requested() {
    let (h, _) = sample_harness().await;
    let (session, _events) = session(&h).await;

    session.set_detected_country(Some("IN".to_string()));
    assert_eq!(session.filters().effective_country().as_deref(), Some("IN"));

    session.set_country(None).await.unwrap();
    assert_eq!(session.filters().effective_country(), None);
    assert_eq!(session.channel_page(0).await.unwrap().len(), 7);
}

#[tokio::test]
async fn test_favorites_survive_resync() {
    let (h, sample) = sample_harness().await;
    let (session, _events) = session(&h).await;
    let sab = h.channels.get_by_url(SAB_SOURCE_1).await.unwrap().unwrap();

    assert!(session.toggle_favorite(&sab).await.unwrap());
    session.sync_playlist(sample).await.wait().await;

    session.set_category(Some("Favorites".to_string()));
    let favorites = session.channel_page(0).await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].stream_url, SAB_SOURCE_1);

    // The stale copy still says "not favorite"; the stored flag decides
    assert!(!session.toggle_favorite(&sab).await.unwrap());
    assert!(session.channel_page(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recently_watched_follows_playback() {
    let (h, _) = sample_harness().await;
    let (session, _events) = session(&h).await;

    let sab = h.channels.get_by_url(SAB_SOURCE_1).await.unwrap().unwrap();
    let bunny = h.channels.get_by_url(BIG_BUCK_BUNNY).await.unwrap().unwrap();
    session.select_channel(&sab).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    session.select_channel(&bunny).await.unwrap();

    let recent: Vec<_> = session
        .recent_channels()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.stream_url)
        .collect();
    assert_eq!(recent, vec![BIG_BUCK_BUNNY, SAB_SOURCE_1]);
}

#[tokio::test]
async fn test_preferences_seed_new_sessions() {
    let (h, _) = sample_harness().await;
    {
        let (session, _events) = session(&h).await;
        session.set_country(Some("in")).await.unwrap();
        session.save_default_category(Some("News")).await.unwrap();
    }

    let (session, _events) = session(&h).await;
    let filters = session.filters();
    assert_eq!(filters.category.as_deref(), Some("News"));
    assert_eq!(filters.country, CountryPreference::Explicit("IN".to_string()));
    assert_eq!(session.channel_page(0).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_select_playlist_reports_sync() {
    let h = harness().await;
    let sample = h.add_playlist("Built-in Samples", INTERNAL_SAMPLE_URL).await;
    let (session, _events) = session(&h).await;

    assert!(session.selected_playlist().await.unwrap().is_none());
    assert!(session.channel_page(0).await.unwrap().is_empty());

    let (selected, ticket) = session.select_playlist(sample.id).await.unwrap();
    assert_eq!(selected.id, sample.id);
    ticket.unwrap().wait().await;

    assert!(!*session.watch_syncing().borrow());
    assert_eq!(session.channel_page(0).await.unwrap().len(), 7);
}

#[tokio::test]
async fn test_view_follows_filters_and_syncs() {
    let h = harness().await;
    let sample = h.add_playlist("Built-in Samples", INTERNAL_SAMPLE_URL).await;
    let (session, _events) = session(&h).await;
    let mut view = session.watch_view();
    assert!(view.borrow().channels.is_empty());

    let (_, ticket) = session.select_playlist(sample.id).await.unwrap();
    ticket.unwrap().wait().await;
    let synced = wait_for_view(&mut view, |v| v.channels.len() == 7).await;
    assert_eq!(synced.categories, vec!["News", "Entertainment", "Test"]);
    assert_eq!(synced.countries, vec!["IN"]);
    assert!(synced.recent.is_empty());

    session.set_category(Some("News".to_string()));
    let news = wait_for_view(&mut view, |v| v.channels.len() == 2).await;
    assert!(news.channels.iter().all(|c| c.category == "News"));

    let sab = h.channels.get_by_url(SAB_SOURCE_1).await.unwrap().unwrap();
    session.select_channel(&sab).await.unwrap();
    let watched = wait_for_view(&mut view, |v| !v.recent.is_empty()).await;
    assert_eq!(watched.recent[0].stream_url, SAB_SOURCE_1);
}

#[tokio::test]
async fn test_sync_blocks_writes_to_its_own_playlist_only() {
    const LIST_A: &str = "http://lists.test/a.m3u";
    const LIST_B: &str = "http://lists.test/b.m3u";

    let h = harness().await;
    h.fetcher.serve(LIST_A, m3u_body("a", 2));
    h.fetcher.serve(LIST_B, m3u_body("b", 2));
    let a = h.add_playlist("A", LIST_A).await;
    let b = h.add_playlist("B", LIST_B).await;
    h.orchestrator.sync(a.clone()).await.wait().await;
    h.orchestrator.sync(b.clone()).await.wait().await;

    let (session, _events) = session(&h).await;
    let channel_a = h.channels.get_by_url("http://a/0").await.unwrap().unwrap();
    let channel_b = h.channels.get_by_url("http://b/0").await.unwrap().unwrap();

    // The re-sync clears playlist A, then hangs with its lock held
    h.fetcher.stall_after(LIST_A, "#EXTM3U\n");
    let ticket = h.orchestrator.sync(a.clone()).await;
    timeout(Duration::from_secs(5), async {
        while h.channels.count_for_playlist(a.id).await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("playlist A was never cleared");

    let short = Duration::from_millis(100);
    assert!(timeout(short, session.toggle_favorite(&channel_a)).await.is_err());
    assert!(timeout(short, session.select_channel(&channel_a)).await.is_err());
    assert!(timeout(short, session.toggle_favorite(&channel_b))
        .await
        .expect("playlist B should not wait on A's sync")
        .unwrap());

    h.orchestrator.cancel_foreground().await;
    assert_eq!(ticket.wait().await, SyncOutcome::Cancelled);

    // Released; the channel itself went with the cleared playlist
    let after = timeout(short, session.toggle_favorite(&channel_a))
        .await
        .expect("lock should be released after cancel");
    assert!(after.is_err());
}
