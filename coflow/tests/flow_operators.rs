use coflow::{flow, flow_of, Flow, FlowCombining, FlowError, FlowExt, FlowTerminal};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn map_and_filter_pipeline_produces_expected_values() {
    let numbers = flow(|collector| async move {
        for value in 0..5 {
            collector.emit(value).await?;
        }
        Ok(())
    });

    let results = Arc::new(Mutex::new(Vec::new()));
    let results_clone = Arc::clone(&results);

    numbers
        .filter_sync(|value| *value % 2 == 0)
        .map(|value| async move { value * 10 })
        .on_each(|value| assert_eq!(value % 10, 0))
        .collect(move |value| {
            results_clone.lock().push(value);
            async {}
        })
        .await
        .unwrap();

    let final_values = results.lock().clone();
    assert_eq!(final_values, vec![0, 20, 40]);
}

#[tokio::test]
async fn drop_and_take_limit_flow_size() {
    let flow = flow_of!(1, 2, 3, 4, 5, 6);

    let values = flow.drop_first(2).take(2).to_vec().await.unwrap();
    assert_eq!(values, vec![3, 4]);
}

#[tokio::test]
async fn doubling_then_filtering_keeps_order() {
    let values = flow_of!(1, 2, 3)
        .map_sync(|x| x * 2)
        .filter_sync(|x| *x > 2)
        .to_vec()
        .await
        .unwrap();
    assert_eq!(values, vec![4, 6]);
}

#[tokio::test]
async fn take_on_infinite_flow_terminates() {
    let naturals = flow(|collector| async move {
        let mut next = 0u64;
        loop {
            collector.emit(next).await?;
            next += 1;
        }
    });

    let values = naturals.take(5).to_vec().await.unwrap();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn take_signals_cancellation_to_the_producer() {
    let observed = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&observed);
    let numbers = flow(move |collector| {
        let slot = Arc::clone(&slot);
        async move {
            for value in 1..=10 {
                if let Err(error) = collector.emit(value).await {
                    *slot.lock() = Some(error.is_cancellation());
                    return Err(error);
                }
            }
            Ok(())
        }
    });

    let values = numbers.take(2).to_vec().await.unwrap();

    assert_eq!(values, vec![1, 2]);
    assert_eq!(*observed.lock(), Some(true));
}

#[tokio::test]
async fn flat_map_concat_runs_inner_flows_in_order() {
    let values = flow_of!(1, 2)
        .flat_map_concat(|v| flow_of!(v, v * 2))
        .to_vec()
        .await
        .unwrap();
    assert_eq!(values, vec![1, 2, 2, 4]);
}

#[tokio::test]
async fn zip_of_uneven_lengths_is_as_long_as_the_shorter() {
    let pairs = flow_of!(1, 2, 3)
        .zip(flow_of!("one", "two"), |n, s| (n, s))
        .to_vec()
        .await
        .unwrap();
    assert_eq!(pairs, vec![(1, "one"), (2, "two")]);
}

#[tokio::test]
async fn combined_pipeline_with_buffer_and_distinct() {
    let values = flow_of!(1, 1, 2, 3, 3, 4)
        .buffer(2)
        .distinct_until_changed()
        .take_while(|x| *x < 4)
        .to_vec()
        .await
        .unwrap();
    assert_eq!(values, vec![1, 2, 3]);
}

#[tokio::test]
async fn operators_do_not_run_until_collected() {
    let mapped = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&mapped);

    let pipeline: Flow<i32> = flow_of!(1, 2, 3).map_sync(move |x| {
        counter.fetch_add(1, Ordering::SeqCst);
        x
    });
    assert_eq!(mapped.load(Ordering::SeqCst), 0);

    pipeline.clone().count().await.unwrap();
    pipeline.count().await.unwrap();
    assert_eq!(mapped.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn fault_in_a_callback_reaches_the_caller() {
    let result = flow_of!(1, 2, 3)
        .transform(|value, collector| async move {
            if value == 2 {
                return Err(FlowError::fault("cannot handle 2"));
            }
            collector.emit(value).await
        })
        .to_vec()
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.to_string(), "producer fault: cannot handle 2");
}
