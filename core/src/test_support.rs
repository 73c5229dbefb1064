use candid::Principal;
use ctor::ctor;

#[ctor]
fn init() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .format_module_path(false)
        .format_target(false)
        .try_init();
}

pub fn owner() -> Principal {
    Principal::from_text("2vxsx-fae").unwrap()
}

pub fn service() -> Principal {
    Principal::from_text("ryjl3-tyaaa-aaaaa-aaaba-cai").unwrap()
}

pub fn wallet() -> Principal {
    Principal::from_text("aaaaa-aa").unwrap()
}
