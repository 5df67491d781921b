//! End-to-end scenarios over the full store facade.

use castore::{metadata::PieceState, Config, Store};
use std::{
    fs,
    io::{Read, Seek, SeekFrom, Write},
    sync::Arc,
    thread,
};

fn fixture() -> (tempfile::TempDir, Store) {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::new(&Config::under_root(tmp.path())).unwrap();
    (tmp, store)
}

#[test]
fn upload_becomes_cache_file() {
    let (tmp, store) = fixture();

    assert!(store.create_upload_file("abc", 100).unwrap());
    store
        .set_upload_file_hash_state("abc", "sha256", "500", &[0x00, 0x01])
        .unwrap();

    // the resumable hash state is addressable by its registry spelling
    let paths = store.list_upload_file_hash_state_paths("abc").unwrap();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].ends_with("/hashstates/sha256/500"));

    store.move_upload_file_to_cache("abc", "def").unwrap();

    let mut reader = store.get_cache_file_reader("def").unwrap();
    assert_eq!(reader.size().unwrap(), 100);
    reader.close().unwrap();

    assert!(!tmp.path().join("upload/abc").exists());
    assert!(tmp.path().join("cache/def").is_file());
}

#[test]
fn refcount_gates_eviction_into_trash() {
    let (tmp, store) = fixture();

    assert!(store.create_download_file("X", 1).unwrap());
    store.move_download_file_to_cache("X").unwrap();

    assert_eq!(store.ref_cache_file("X").unwrap(), 1);
    assert!(store
        .move_cache_file_to_trash("X")
        .unwrap_err()
        .is_still_referenced());

    assert_eq!(store.deref_cache_file("X").unwrap(), 0);
    assert!(!tmp.path().join("cache/X").exists());

    let trash: Vec<String> = fs::read_dir(tmp.path().join("trash"))
        .unwrap()
        .map(|dirent| dirent.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(trash.len(), 1);
    assert!(trash[0].starts_with("X."));
}

#[test]
fn parallel_creators_elect_exactly_one_winner() {
    let (_tmp, store) = fixture();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || store.create_upload_file("Y", 1).unwrap())
        })
        .collect();

    let created: usize = handles
        .into_iter()
        .map(|handle| handle.join().unwrap() as usize)
        .sum();
    assert_eq!(created, 1);
}

#[test]
fn reader_survives_a_move_to_cache() {
    let (_tmp, store) = fixture();

    store.create_download_file("blob", 0).unwrap();
    let mut handle = store.get_download_file_read_writer("blob").unwrap();
    handle.write_all(b"content-addressed").unwrap();

    store.move_download_file_to_cache("blob").unwrap();

    handle.seek(SeekFrom::Start(0)).unwrap();
    let mut read_back = String::new();
    handle.read_to_string(&mut read_back).unwrap();
    assert_eq!(read_back, "content-addressed");
    handle.close().unwrap();
}

#[test]
fn cached_blobs_report_all_pieces_done() {
    let (_tmp, store) = fixture();

    store.create_download_file("blob", 16).unwrap();
    store.move_download_file_to_cache("blob").unwrap();

    assert_eq!(
        store.get_file_piece_status("blob", 0, 4).unwrap(),
        vec![PieceState::Done; 4]
    );
}

#[test]
fn parallel_ref_and_deref_converge() {
    let (_tmp, store) = fixture();
    let store = Arc::new(store);

    store.create_download_file("blob", 1).unwrap();
    store.move_download_file_to_cache("blob").unwrap();
    assert_eq!(store.ref_cache_file("blob").unwrap(), 1);

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || store.ref_cache_file("blob").unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.get_cache_file_ref_count("blob").unwrap(), 101);

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || store.deref_cache_file("blob").unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.get_cache_file_ref_count("blob").unwrap(), 1);

    // the file never hit zero, so it must still be cached
    store.get_cache_file_reader("blob").unwrap().close().unwrap();
}

#[test]
fn survives_a_restart() {
    let (tmp, store) = fixture();

    store.create_download_file("blob", 8).unwrap();
    store
        .write_download_file_piece_status("blob", &[PieceState::Done, PieceState::Dirty])
        .unwrap();
    store.move_download_file_to_cache("blob").unwrap();
    drop(store);

    // a brand-new store over the same root rebuilds entries lazily
    let store = Store::new(&Config::under_root(tmp.path())).unwrap();
    assert_eq!(store.get_cache_file_stat("blob").unwrap().len(), 8);
    assert_eq!(store.ref_cache_file("blob").unwrap(), 1);
    assert_eq!(store.deref_cache_file("blob").unwrap(), 0);
}

#[test]
fn downloads_land_remote_bytes_atomically() {
    let (tmp, store) = fixture();

    let mut source: &[u8] = b"fetched from a peer";
    store.create_cache_file("blob", &mut source).unwrap();

    let mut reader = store.get_cache_file_reader("blob").unwrap();
    let mut content = String::new();
    reader.read_to_string(&mut content).unwrap();
    assert_eq!(content, "fetched from a peer");
    reader.close().unwrap();

    // the scratch file is gone
    assert_eq!(fs::read_dir(tmp.path().join("upload")).unwrap().count(), 0);
}
