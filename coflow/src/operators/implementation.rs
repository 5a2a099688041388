use super::*;
use crate::buffer::{self, DEFAULT_BUFFER_CAPACITY};
use crate::error::AbortOwner;
use crate::FlowError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

impl<T> FlowExt<T> for Flow<T>
where
    T: Send + 'static,
{
    fn map<U, F, Fut>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static,
    {
        self.transform(move |value, collector| {
            let mapped = f(value);
            async move { collector.emit(mapped.await).await }
        })
    }

    fn map_sync<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.transform(move |value, collector| {
            let mapped = f(value);
            async move { collector.emit(mapped).await }
        })
    }

    fn filter<F, Fut>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.transform(move |value, collector| {
            let keep = predicate(&value);
            async move {
                if keep.await {
                    collector.emit(value).await
                } else {
                    Ok(())
                }
            }
        })
    }

    fn filter_sync<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.transform(move |value, collector| {
            let keep = predicate(&value);
            async move {
                if keep {
                    collector.emit(value).await
                } else {
                    Ok(())
                }
            }
        })
    }

    fn transform<U, F, Fut>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T, FlowCollector<U>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult> + Send + 'static,
    {
        let f = Arc::new(f);
        Flow::new(move |downstream: FlowCollector<U>| {
            let upstream = self.clone();
            let f = Arc::clone(&f);
            async move {
                upstream
                    .collect_with(FlowCollector::new(move |value| f(value, downstream.clone())))
                    .await
            }
        })
    }

    fn take(self, count: usize) -> Flow<T> {
        Flow::new(move |downstream: FlowCollector<T>| {
            let upstream = self.clone();
            async move {
                if count == 0 {
                    return Ok(());
                }

                let owner = AbortOwner::next();
                let remaining = Arc::new(AtomicUsize::new(count));
                let result = upstream
                    .collect_with(FlowCollector::new(move |value| {
                        let downstream = downstream.clone();
                        let left = remaining.load(Ordering::SeqCst);
                        if left > 0 {
                            remaining.store(left - 1, Ordering::SeqCst);
                        }
                        async move {
                            // a producer that ignored the previous abort
                            if left == 0 {
                                return Err(FlowError::Aborted(owner));
                            }
                            downstream.emit(value).await?;
                            if left == 1 {
                                Err(FlowError::Aborted(owner))
                            } else {
                                Ok(())
                            }
                        }
                    }))
                    .await;
                owner.absorb(result)
            }
        })
    }

    fn drop_first(self, count: usize) -> Flow<T> {
        Flow::new(move |downstream: FlowCollector<T>| {
            let upstream = self.clone();
            async move {
                let skipped = Arc::new(AtomicUsize::new(0));
                upstream
                    .collect_with(FlowCollector::new(move |value| {
                        let downstream = downstream.clone();
                        let forward = skipped.load(Ordering::SeqCst) >= count;
                        if !forward {
                            skipped.fetch_add(1, Ordering::SeqCst);
                        }
                        async move {
                            if forward {
                                downstream.emit(value).await
                            } else {
                                Ok(())
                            }
                        }
                    }))
                    .await
            }
        })
    }

    fn take_while<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        Flow::new(move |downstream: FlowCollector<T>| {
            let upstream = self.clone();
            let predicate = Arc::clone(&predicate);
            async move {
                let owner = AbortOwner::next();
                let result = upstream
                    .collect_with(FlowCollector::new(move |value| {
                        let downstream = downstream.clone();
                        let keep = predicate(&value);
                        async move {
                            if keep {
                                downstream.emit(value).await
                            } else {
                                Err(FlowError::Aborted(owner))
                            }
                        }
                    }))
                    .await;
                owner.absorb(result)
            }
        })
    }

    fn drop_while<F>(self, predicate: F) -> Flow<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        Flow::new(move |downstream: FlowCollector<T>| {
            let upstream = self.clone();
            let predicate = Arc::clone(&predicate);
            async move {
                let dropping = Arc::new(AtomicBool::new(true));
                upstream
                    .collect_with(FlowCollector::new(move |value| {
                        let downstream = downstream.clone();
                        let skip = dropping.load(Ordering::SeqCst) && predicate(&value);
                        if !skip {
                            dropping.store(false, Ordering::SeqCst);
                        }
                        async move {
                            if skip {
                                Ok(())
                            } else {
                                downstream.emit(value).await
                            }
                        }
                    }))
                    .await
            }
        })
    }

    fn on_each<F>(self, f: F) -> Flow<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.transform(move |value, collector| {
            f(&value);
            async move { collector.emit(value).await }
        })
    }

    fn distinct_until_changed(self) -> Flow<T>
    where
        T: Clone + PartialEq,
    {
        Flow::new(move |downstream: FlowCollector<T>| {
            let upstream = self.clone();
            async move {
                let last: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
                upstream
                    .collect_with(FlowCollector::new(move |value: T| {
                        let downstream = downstream.clone();
                        let fresh = {
                            let mut last = last.lock();
                            if last.as_ref() == Some(&value) {
                                false
                            } else {
                                *last = Some(value.clone());
                                true
                            }
                        };
                        async move {
                            if fresh {
                                downstream.emit(value).await
                            } else {
                                Ok(())
                            }
                        }
                    }))
                    .await
            }
        })
    }

    fn flat_map_concat<U, F>(self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flow<U> + Send + Sync + 'static,
    {
        self.transform(move |value, collector| {
            let inner = f(value);
            async move { inner.collect_with(collector).await }
        })
    }

    fn buffer(self, capacity: usize) -> Flow<T> {
        self.buffer_with(Some(capacity), BufferOverflow::Suspend)
    }

    fn buffer_unbounded(self) -> Flow<T> {
        self.buffer_with(None, BufferOverflow::Suspend)
    }

    fn buffer_with(self, capacity: Option<usize>, overflow: BufferOverflow) -> Flow<T> {
        decoupled(self, capacity, overflow, None)
    }

    fn conflate(self) -> Flow<T> {
        self.buffer_with(Some(1), BufferOverflow::DropOldest)
    }

    fn flow_on(self, dispatcher: Dispatcher) -> Flow<T> {
        decoupled(
            self,
            Some(DEFAULT_BUFFER_CAPACITY),
            BufferOverflow::Suspend,
            Some(dispatcher),
        )
    }
}

/// Collect `upstream` in its own job and hand values over through a queue.
fn decoupled<T>(
    upstream: Flow<T>,
    capacity: Option<usize>,
    overflow: BufferOverflow,
    dispatcher: Option<Dispatcher>,
) -> Flow<T>
where
    T: Send + 'static,
{
    Flow::new(move |collector: FlowCollector<T>| {
        let upstream = upstream.clone();
        let dispatcher = dispatcher.clone();
        async move {
            if let Some(dispatcher) = &dispatcher {
                tracing::debug!(
                    dispatcher = %dispatcher.name(),
                    "collecting upstream segment on dispatcher"
                );
            }
            let (sender, receiver) = buffer::channel(capacity, overflow);
            let job = buffer::produce(upstream, sender, dispatcher);
            let producer = job.guard();
            let result = buffer::drain(&receiver, &collector).await;

            // the producer's teardown finishes before this segment reports back
            drop(receiver);
            producer.cancel_and_join().await;
            result
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::terminal::FlowTerminal;
    use crate::{flow, flow_of, Flow, FlowError, FlowExt};
    use coflow_core::{current_context_name, Dispatchers};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn one_to_ten() -> Flow<i32> {
        flow(|collector| async move {
            for i in 1..=10 {
                collector.emit(i).await?;
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn map_then_filter() {
        let result = flow_of!(1, 2, 3)
            .map_sync(|x| x * 2)
            .filter_sync(|x| *x > 2)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(result, vec![4, 6]);
    }

    #[tokio::test]
    async fn async_map_and_filter() {
        let result = one_to_ten()
            .map(|x| async move { x * 10 })
            .filter(|x| {
                let keep = *x % 20 == 0;
                async move { keep }
            })
            .to_vec()
            .await
            .unwrap();
        assert_eq!(result, vec![20, 40, 60, 80, 100]);
    }

    #[tokio::test]
    async fn transform_emits_many_per_value() {
        let result = flow_of!(1, 2, 3)
            .transform(|value, collector| async move {
                collector.emit(format!("value: {value}")).await?;
                collector.emit(format!("square: {}", value * value)).await
            })
            .to_vec()
            .await
            .unwrap();
        assert_eq!(
            result,
            vec!["value: 1", "square: 1", "value: 2", "square: 4", "value: 3", "square: 9"]
        );
    }

    #[tokio::test]
    async fn take_stops_upstream() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&produced);
        let numbers = flow(move |collector| {
            let counter = Arc::clone(&counter);
            async move {
                loop {
                    let next = counter.fetch_add(1, Ordering::SeqCst);
                    collector.emit(next).await?;
                }
            }
        });

        let result = numbers.take(3).to_vec().await.unwrap();

        assert_eq!(result, vec![0, 1, 2]);
        assert_eq!(produced.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn take_zero_never_starts_upstream() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let numbers = flow(move |collector| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                collector.emit(1).await
            }
        });

        assert!(numbers.take(0).to_vec().await.unwrap().is_empty());
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn take_more_than_available() {
        let result = flow_of!(1, 2).take(5).to_vec().await.unwrap();
        assert_eq!(result, vec![1, 2]);
    }

    #[tokio::test]
    async fn nested_takes_only_absorb_their_own_abort() {
        let result = one_to_ten().take(5).take(2).to_vec().await.unwrap();
        assert_eq!(result, vec![1, 2]);
    }

    #[tokio::test]
    async fn drop_first_skips_prefix() {
        let result = one_to_ten().drop_first(5).to_vec().await.unwrap();
        assert_eq!(result, vec![6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn take_while_and_drop_while() {
        let head = one_to_ten().take_while(|x| *x < 4).to_vec().await.unwrap();
        assert_eq!(head, vec![1, 2, 3]);

        let tail = flow_of!(1, 2, 5, 1)
            .drop_while(|x| *x < 3)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(tail, vec![5, 1]);
    }

    #[tokio::test]
    async fn distinct_until_changed_collapses_runs() {
        let result = flow_of!(1, 1, 2, 2, 2, 1, 3, 3)
            .distinct_until_changed()
            .to_vec()
            .await
            .unwrap();
        assert_eq!(result, vec![1, 2, 1, 3]);
    }

    #[tokio::test]
    async fn on_each_observes_every_value() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let result = flow_of!(1, 2, 3)
            .on_each(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .to_vec()
            .await
            .unwrap();

        assert_eq!(result, vec![1, 2, 3]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn flat_map_concat_is_sequential() {
        let result = flow_of!(1, 2)
            .flat_map_concat(|v| flow_of!(v, v * 2))
            .to_vec()
            .await
            .unwrap();
        assert_eq!(result, vec![1, 2, 2, 4]);

        let tripled = flow_of!(1, 2, 3)
            .flat_map_concat(|v| flow_of!(v, v * 2, v * 3))
            .take(4)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(tripled, vec![1, 2, 3, 2]);
    }

    #[tokio::test]
    async fn faults_pass_through_operators() {
        let failing: Flow<i32> = flow(|collector| async move {
            collector.emit(1).await?;
            Err(FlowError::fault("boom"))
        });

        let result = failing.map_sync(|x| x + 1).filter_sync(|_| true).to_vec().await;
        assert!(matches!(result, Err(FlowError::Producer(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn buffer_lets_producer_run_ahead() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&produced);
        let numbers = flow(move |collector| {
            let counter = Arc::clone(&counter);
            async move {
                for i in 1..=5 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    collector.emit(i).await?;
                }
                Ok(())
            }
        });

        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let started = tokio::time::Instant::now();
        numbers
            .buffer(64)
            .collect(move |value| {
                sink.lock().push(value);
                tokio::time::sleep(Duration::from_millis(200))
            })
            .await
            .unwrap();

        assert_eq!(*observed.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(produced.load(Ordering::SeqCst), 5);
        // sequential execution would take 5 * (100 + 200)ms
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn conflate_skips_stale_values() {
        let numbers = flow(|collector| async move {
            for i in 1..=5 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                collector.emit(i).await?;
            }
            Ok(())
        });

        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        numbers
            .conflate()
            .collect(move |value| {
                sink.lock().push(value);
                tokio::time::sleep(Duration::from_millis(250))
            })
            .await
            .unwrap();

        assert_eq!(*observed.lock(), vec![1, 3, 5]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flow_on_moves_only_upstream() {
        let upstream_contexts = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let record = Arc::clone(&upstream_contexts);
        let numbers = flow(move |collector| {
            let record = Arc::clone(&record);
            async move {
                for i in 1..=3 {
                    record.lock().push(current_context_name());
                    collector.emit(i).await?;
                }
                Ok(())
            }
        });

        let downstream_contexts = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&downstream_contexts);
        let result = numbers
            .flow_on(Dispatchers::io())
            .map_sync(move |value| {
                sink.lock().push(current_context_name());
                value
            })
            .to_vec()
            .await
            .unwrap();

        assert_eq!(result, vec![1, 2, 3]);
        assert!(upstream_contexts.lock().iter().all(|name| name == "io"));
        assert!(downstream_contexts.lock().iter().all(|name| name == "main"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn each_flow_on_affects_its_own_segment() {
        let stages = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let map_stage = Arc::clone(&stages);
        let filter_stage = Arc::clone(&stages);

        let result = flow_of!(1, 2, 3, 4, 5)
            .map_sync(move |x| {
                map_stage.lock().push(("map", current_context_name()));
                x * 2
            })
            .flow_on(Dispatchers::io())
            .filter_sync(move |x| {
                filter_stage.lock().push(("filter", current_context_name()));
                x % 3 == 0
            })
            .flow_on(Dispatchers::default())
            .to_vec()
            .await
            .unwrap();

        assert_eq!(result, vec![6]);
        for (stage, context) in stages.lock().iter() {
            match *stage {
                "map" => assert_eq!(context, "io"),
                _ => assert_eq!(context, "default"),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flow_on_forwards_upstream_fault() {
        let failing: Flow<i32> = flow(|collector| async move {
            collector.emit(1).await?;
            Err(FlowError::fault("Test exception"))
        });

        let result = failing.flow_on(Dispatchers::io()).to_vec().await;
        assert!(matches!(result, Err(FlowError::Producer(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flow_on_cancels_producer_when_downstream_stops() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&produced);
        let numbers = flow(move |collector| {
            let counter = Arc::clone(&counter);
            async move {
                loop {
                    counter.fetch_add(1, Ordering::SeqCst);
                    collector.emit(()).await?;
                }
            }
        });

        let taken = numbers
            .flow_on(Dispatchers::io())
            .take(3)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(taken.len(), 3);

        // the producer is already gone when take returns
        let settled = produced.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(produced.load(Ordering::SeqCst), settled);
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flow_on_returns_after_producer_cleanup() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned);
        let numbers = flow(move |collector| {
            let flag = Arc::clone(&flag);
            async move {
                let _connection = SetOnDrop(flag);
                for i in 0.. {
                    collector.emit(i).await?;
                }
                Ok(())
            }
        });

        let first = numbers
            .flow_on(Dispatchers::io())
            .take(1)
            .to_vec()
            .await
            .unwrap();

        assert_eq!(first, vec![0]);
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn buffer_returns_after_idle_producer_cleanup() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned);
        let numbers = flow(move |collector| {
            let flag = Arc::clone(&flag);
            async move {
                let _connection = SetOnDrop(flag);
                collector.emit(1).await?;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                collector.emit(2).await
            }
        });

        let first = numbers.buffer(4).first().await.unwrap();

        assert_eq!(first, 1);
        assert!(cleaned.load(Ordering::SeqCst));
    }
}
