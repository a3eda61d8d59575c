//! Periodic position sampling
//!
//! While a track plays, a worker thread nudges the engine at a fixed
//! interval so it can refresh the reported position.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use crate::backend::Signal;


/// How often the worker checks its stop flag.
const POLL_SLICE: Duration = Duration::from_millis( 20 );


/// Handle to a running sampling thread. Dropping it stops and joins the thread.
pub(crate) struct Sampler {
    stop_flag: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}


impl Sampler {
    pub(crate) fn start( interval: Duration, tx: Sender<Signal> ) -> Self {
        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let stop_flag_clone = Arc::clone( &stop_flag );

        let thread = thread::spawn( move || {
            let mut due = Instant::now() + interval;
            while !stop_flag_clone.load( Ordering::Relaxed ) {
                let now = Instant::now();
                if now >= due {
                    if tx.send( Signal::Sample ).is_err() {
                        break;
                    }
                    due = now + interval;
                }
                thread::sleep( POLL_SLICE.min( due.saturating_duration_since( now ) ).max( Duration::from_millis( 1 ) ) );
            }
            tracing::trace!( "Sampler: exiting" );
        });

        Self {
            stop_flag,
            thread: Some( thread ),
        }
    }
}


impl Drop for Sampler {
    fn drop( &mut self ) {
        self.stop_flag.store( true, Ordering::Relaxed );
        if let Some( thread ) = self.thread.take() {
            let _ = thread.join();
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::sync::mpsc;


    #[test]
    fn test_sampler_ticks_until_dropped() {
        let ( tx, rx ) = mpsc::channel();
        let sampler = Sampler::start( Duration::from_millis( 10 ), tx );

        let first = rx.recv_timeout( Duration::from_secs( 2 ) );
        assert!( matches!( first, Ok( Signal::Sample ) ) );

        drop( sampler );
        // Thread joined: the sender is gone once buffered ticks drain.
        while rx.try_recv().is_ok() {}
        assert!( matches!( rx.try_recv(), Err( mpsc::TryRecvError::Disconnected ) ) );
    }
}
