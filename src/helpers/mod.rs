mod backoff_retry;
mod load_dotenv;
mod time;

pub use backoff_retry::reconnect_backoff;
pub use load_dotenv::load_dotenv;
pub use time::now_epoch_ms;

use rand::RngCore;

pub fn rand_hex(bytes: usize) -> String {
    let mut rand = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut rand);
    hex::encode(rand)
}
