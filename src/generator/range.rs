use super::{GeneratorState, Resumable, Sequence};

///
/// 半开区间[start, end)上按步长递增的函数体
///
#[derive(Debug, Clone)]
pub struct Range {
    next:   i64,    //下一个产出值
    end:    i64,    //结束值，不包含
    step:   i64,    //步长
}

impl Range {
    /// 构建区间函数体，步长必须为正数
    pub fn new(start: i64, end: i64, step: i64) -> Self {
        assert!(step > 0, "Range step must be positive, step: {}", step);

        Range {
            next: start,
            end,
            step,
        }
    }
}

impl Resumable for Range {
    type Yield = i64;
    type Return = ();

    fn resume(&mut self) -> GeneratorState<i64, ()> {
        if self.next >= self.end {
            return GeneratorState::Complete(());
        }

        let value = self.next;
        //溢出则下次恢复时完成
        self.next = value.checked_add(self.step).unwrap_or(self.end);
        GeneratorState::Yielded(value)
    }
}

/// 生成半开区间[start, end)上按步长递增的序列
pub fn range(start: i64, end: i64, step: i64) -> Sequence<i64> {
    Sequence::new(Range::new(start, end, step))
}

#[test]
fn test_range() {
    assert_eq!(range(0, 5, 2).collect::<Vec<i64>>(), vec![0, 2, 4]);
    assert_eq!(range(0, 0, 1).count(), 0);
    assert_eq!(range(5, 0, 1).count(), 0);
    assert_eq!(range(-3, 3, 3).collect::<Vec<i64>>(), vec![-3, 0]);
    assert_eq!(range(i64::MAX - 2, i64::MAX, 5).collect::<Vec<i64>>(), vec![i64::MAX - 2]);
}

#[test]
fn test_range_count_and_order() {
    for start in -4..4i64 {
        for len in 1..20i64 {
            for step in 1..7i64 {
                let values: Vec<i64> = range(start, start + len, step).collect();

                //共产出ceil(len / step)个值
                assert_eq!(values.len() as i64, (len + step - 1) / step);
                for (k, value) in values.iter().enumerate() {
                    assert_eq!(*value, start + k as i64 * step);
                }
            }
        }
    }
}

#[test]
fn test_range_is_eager() {
    let seq = range(7, 8, 1);
    assert_eq!(seq.current().ok(), Some(&7));
}

#[test]
#[should_panic(expected = "step must be positive")]
fn test_range_zero_step() {
    let _ = range(0, 10, 0);
}
