#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end lifecycle scenarios: install from archive, upgrade, uninstall,
//! reset and activation-state changes, driven through a real `Manager` over a
//! temp-directory module place.

mod common;

use common::{build_archive, manifest_json, rig, write_module};
use modhost::{LifecycleEvent, ModuleManifest};
use semver::Version;

#[tokio::test]
async fn fresh_install_lands_in_first_place() {
    let place = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    let rig = rig(place.path(), &["shop.Module"], false);

    let archive = archives.path().join("shop-1.0.0.zip");
    build_archive(&archive, "shop", &manifest_json("shop", "1.0.0"));
    rig.manager.install(&archive).await.unwrap();

    assert!(place.path().join("shop/ShopModule.json").is_file());
    assert!(place.path().join("shop/assets/app.css").is_file());
    let shop = rig.manager.catalog().get_by_id("shop").unwrap().unwrap();
    assert_eq!(shop.version, Version::new(1, 0, 0));
    assert_eq!(rig.probe.calls(), vec!["shop:install"]);
}

#[tokio::test]
async fn install_fires_before_and_after_hooks() {
    let place = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    let rig = rig(place.path(), &["shop.Module"], false);

    let order = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let before = std::sync::Arc::clone(&order);
    rig.manager.on(LifecycleEvent::BeforeInstall, move |event| {
        before.lock().push(format!("before:{}", event.module.id()));
    });
    let after = std::sync::Arc::clone(&order);
    rig.manager.on(LifecycleEvent::AfterInstall, move |event| {
        after.lock().push(format!("after:{}", event.module.id()));
    });

    let archive = archives.path().join("shop.zip");
    build_archive(&archive, "shop", &manifest_json("shop", "1.0.0"));
    rig.manager.install(&archive).await.unwrap();

    assert_eq!(order.lock().clone(), vec!["before:shop", "after:shop"]);
}

#[tokio::test]
async fn declined_install_hook_skips_auto_activation() {
    let place = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    let rig = rig(place.path(), &["shop.Module"], true);
    rig.probe.decline("install");

    let archive = archives.path().join("shop.zip");
    build_archive(&archive, "shop", &manifest_json("shop", "1.0.0"));
    // A declining install hook is not a failure, the files stay installed.
    rig.manager.install(&archive).await.unwrap();

    assert!(place.path().join("shop/ShopModule.json").is_file());
    assert_eq!(rig.probe.calls(), vec!["shop:install"]);
}

#[tokio::test]
async fn installing_an_existing_id_upgrades_in_place() {
    let place = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    write_module(place.path(), "shop", &manifest_json("shop", "1.0.0"));
    let rig = rig(place.path(), &["shop.Module"], false);

    let archive = archives.path().join("shop-1.1.0.zip");
    build_archive(&archive, "shop", &manifest_json("shop", "1.1.0"));
    rig.manager.install(&archive).await.unwrap();

    assert_eq!(rig.probe.calls(), vec!["shop:upgrade"]);
    let on_disk = ModuleManifest::load(&place.path().join("shop/ShopModule.json")).unwrap();
    assert_eq!(on_disk.config.version, Version::new(1, 1, 0));
    assert!(place.path().join("shop/assets/app.css").is_file());
    // The cache was invalidated: the registry reflects the upgraded install.
    let shop = rig.manager.catalog().get_by_id("shop").unwrap().unwrap();
    assert_eq!(shop.version, Version::new(1, 1, 0));
}

#[tokio::test]
async fn reinstalling_the_same_version_is_a_noop() {
    let place = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    write_module(place.path(), "shop", &manifest_json("shop", "1.0.0"));
    let rig = rig(place.path(), &["shop.Module"], false);

    let archive = archives.path().join("shop-1.0.0.zip");
    build_archive(&archive, "shop", &manifest_json("shop", "1.0.0"));
    rig.manager.install(&archive).await.unwrap();

    // Not newer: no module hook runs, the installed tree is untouched.
    assert!(rig.probe.calls().is_empty());
    let on_disk = ModuleManifest::load(&place.path().join("shop/ShopModule.json")).unwrap();
    assert_eq!(on_disk.config.version, Version::new(1, 0, 0));
}

#[tokio::test]
async fn declined_upgrade_leaves_existing_install_untouched() {
    let place = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    write_module(place.path(), "shop", &manifest_json("shop", "1.0.0"));
    let rig = rig(place.path(), &["shop.Module"], false);
    rig.probe.decline("upgrade");

    let archive = archives.path().join("shop-2.0.0.zip");
    build_archive(&archive, "shop", &manifest_json("shop", "2.0.0"));
    let err = rig.manager.install(&archive).await.unwrap_err();
    assert!(err.to_string().starts_with("install failed"));

    let on_disk = ModuleManifest::load(&place.path().join("shop/ShopModule.json")).unwrap();
    assert_eq!(on_disk.config.version, Version::new(1, 0, 0));
}

#[tokio::test]
async fn uninstall_removes_the_module_directory() {
    let place = tempfile::tempdir().unwrap();
    write_module(place.path(), "shop", &manifest_json("shop", "1.0.0"));
    let rig = rig(place.path(), &["shop.Module"], false);

    rig.manager.uninstall("shop").await.unwrap();

    assert!(!place.path().join("shop").exists());
    assert_eq!(rig.probe.calls(), vec!["shop:uninstall"]);
    assert!(rig.manager.catalog().get_by_id("shop").unwrap().is_none());
}

#[tokio::test]
async fn declined_uninstall_keeps_the_files() {
    let place = tempfile::tempdir().unwrap();
    write_module(place.path(), "shop", &manifest_json("shop", "1.0.0"));
    let rig = rig(place.path(), &["shop.Module"], false);
    rig.probe.decline("uninstall");

    rig.manager.uninstall("shop").await.unwrap();

    assert!(place.path().join("shop/ShopModule.json").is_file());
    assert_eq!(rig.probe.calls(), vec!["shop:uninstall"]);
}

#[tokio::test]
async fn uninstalling_an_unknown_module_fails() {
    let place = tempfile::tempdir().unwrap();
    let rig = rig(place.path(), &[], false);

    let err = rig.manager.uninstall("ghost").await.unwrap_err();
    assert_eq!(err.op, "uninstall");
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn reset_replays_uninstall_then_install() {
    let place = tempfile::tempdir().unwrap();
    write_module(place.path(), "shop", &manifest_json("shop", "1.0.0"));
    let rig = rig(place.path(), &["shop.Module"], false);

    rig.manager.reset("shop").await.unwrap();

    assert_eq!(rig.probe.calls(), vec!["shop:uninstall", "shop:install"]);
    // Reset is hooks-only, the files stay.
    assert!(place.path().join("shop/ShopModule.json").is_file());
}

#[tokio::test]
async fn reset_stops_when_the_module_declines_uninstall() {
    let place = tempfile::tempdir().unwrap();
    write_module(place.path(), "shop", &manifest_json("shop", "1.0.0"));
    let rig = rig(place.path(), &["shop.Module"], false);
    rig.probe.decline("uninstall");

    rig.manager.reset("shop").await.unwrap();
    assert_eq!(rig.probe.calls(), vec!["shop:uninstall"]);
}

#[tokio::test]
async fn state_changes_persist_into_the_entry_manifest() {
    let place = tempfile::tempdir().unwrap();
    let entry = write_module(place.path(), "shop", &manifest_json("shop", "1.0.0"));
    let rig = rig(place.path(), &["shop.Module"], false);

    let off = rig.manager.turn_off("shop").await.unwrap();
    assert!(!off.enabled);
    assert!(!ModuleManifest::load(&entry).unwrap().config.enabled);
    let listed = rig.manager.catalog().get_by_id("shop").unwrap().unwrap();
    assert!(!listed.enabled);

    let on = rig.manager.turn_on("shop").await.unwrap();
    assert!(on.enabled);
    assert!(ModuleManifest::load(&entry).unwrap().config.enabled);

    let flipped = rig.manager.toggle("shop").await.unwrap();
    assert!(!flipped.enabled);
    assert!(!ModuleManifest::load(&entry).unwrap().config.enabled);
}

#[tokio::test]
async fn before_hook_veto_skips_the_state_change() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let place = tempfile::tempdir().unwrap();
    let entry = write_module(place.path(), "shop", &manifest_json("shop", "1.0.0"));
    let rig = rig(place.path(), &["shop.Module"], false);

    rig.manager
        .on(LifecycleEvent::BeforeChangeState, |event| {
            event.is_valid = false;
        });
    let after_fired = std::sync::Arc::new(AtomicBool::new(false));
    let flag = std::sync::Arc::clone(&after_fired);
    rig.manager.on(LifecycleEvent::AfterChangeState, move |_| {
        flag.store(true, Ordering::SeqCst);
    });

    let unchanged = rig.manager.turn_off("shop").await.unwrap();
    assert!(unchanged.enabled);
    assert!(ModuleManifest::load(&entry).unwrap().config.enabled);
    // A vetoed operation never reaches the after hook.
    assert!(!after_fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn archive_without_a_module_id_is_rejected() {
    let place = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    let rig = rig(place.path(), &["shop.Module"], false);

    let mut manifest = manifest_json("shop", "1.0.0");
    manifest["config"].as_object_mut().unwrap().remove("id");
    let archive = archives.path().join("nameless.zip");
    build_archive(&archive, "shop", &manifest);

    let err = rig.manager.install(&archive).await.unwrap_err();
    assert!(err.to_string().contains("not a valid app module"));
    // The nameless tree never lands on the place root and nothing is listed.
    assert!(!place.path().join("ShopModule.json").exists());
    assert!(rig.manager.list().unwrap().is_empty());
}

#[tokio::test]
async fn archive_without_an_entry_file_is_rejected() {
    let place = tempfile::tempdir().unwrap();
    let archives = tempfile::tempdir().unwrap();
    let rig = rig(place.path(), &[], false);

    let archive = archives.path().join("junk.zip");
    {
        use std::io::Write as _;
        let file = std::fs::File::create(&archive).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("readme.txt", options).unwrap();
        zip.write_all(b"nothing here").unwrap();
        zip.finish().unwrap();
    }

    let err = rig.manager.install(&archive).await.unwrap_err();
    assert!(err.to_string().contains("no entry file"));
}
