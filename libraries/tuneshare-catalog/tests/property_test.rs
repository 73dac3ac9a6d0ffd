//! Property-based tests for commit accounting
//!
//! Random batches of operations against one database check that a commit
//! advances the revision by exactly one when anything changed, and that a
//! rolled back or failed batch changes nothing.

use proptest::prelude::*;
use tuneshare_catalog::{Database, DatabaseId, Library, Mutate, Operation, Song, SongField, SongId};

// ===== Helpers =====

#[derive(Debug, Clone)]
enum Step {
    AddSong(usize),
    RemoveSong(usize),
    Rename(usize, u8),
    SetLibraryName(u8),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0usize..6).prop_map(Step::AddSong),
        (0usize..6).prop_map(Step::RemoveSong),
        (0usize..6, 0u8..3).prop_map(|(i, n)| Step::Rename(i, n)),
        (0u8..3).prop_map(Step::SetLibraryName),
    ]
}

fn to_operation(step: &Step, db: DatabaseId, songs: &[Song]) -> Operation {
    match step {
        Step::AddSong(i) => Operation::AddSong {
            database: db,
            song: songs[*i].clone(),
        },
        Step::RemoveSong(i) => Operation::RemoveSong {
            database: db,
            song: songs[*i].id(),
        },
        Step::Rename(i, n) => Operation::UpdateSong {
            song: songs[*i].id(),
            field: SongField::Name,
            value: Some(format!("name-{n}").into()),
        },
        Step::SetLibraryName(n) => Operation::SetLibraryName {
            name: format!("library-{n}"),
        },
    }
}

fn setup() -> (Library, DatabaseId, Vec<Song>) {
    let library = Library::new("library-0");
    let db = library.immediate().add_database(Database::new("D")).unwrap();
    let songs = (0..6).map(|i| Song::new(format!("name-{i}"))).collect();
    (library, db, songs)
}

fn song_ids(library: &Library, db: DatabaseId) -> Vec<SongId> {
    library
        .snapshot()
        .database(db)
        .unwrap()
        .songs()
        .map(|e| e.song.id())
        .collect()
}

// ===== Property Tests =====

proptest! {
    /// Property: each commit bumps the revision by one iff the snapshot changed
    #[test]
    fn revision_tracks_effective_change(batches in prop::collection::vec(prop::collection::vec(step(), 0..6), 1..8)) {
        let (library, db, songs) = setup();

        for batch in &batches {
            let before = library.snapshot();
            let mut tx = library.transaction();
            for step in batch {
                tx.stage(to_operation(step, db, &songs)).unwrap();
            }
            let outcome = tx.commit().unwrap();
            let after = library.snapshot();

            if outcome.changed {
                prop_assert_eq!(after.revision(), before.revision() + 1);
            } else {
                prop_assert_eq!(after.revision(), before.revision());
                prop_assert_eq!(&*after, &*before);
            }
        }
    }

    /// Property: rollback leaves the snapshot untouched
    #[test]
    fn rollback_is_invisible(batch in prop::collection::vec(step(), 0..10)) {
        let (library, db, songs) = setup();
        let before = library.snapshot();
        let ids_before = song_ids(&library, db);

        let mut tx = library.transaction();
        for step in &batch {
            tx.stage(to_operation(step, db, &songs)).unwrap();
        }
        tx.rollback().unwrap();

        prop_assert_eq!(&*library.snapshot(), &*before);
        prop_assert_eq!(song_ids(&library, db), ids_before);
    }
}
