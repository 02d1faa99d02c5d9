use rust_decimal::Decimal;

pub fn minmax<'a>(values: impl Iterator<Item = &'a Decimal>) -> (Decimal, Decimal) {
    let mut min = Decimal::MAX;
    let mut max = Decimal::MIN;
    for value in values {
        min = Decimal::min(min, *value);
        max = Decimal::max(max, *value);
    }
    (min, max)
}

pub struct Pairwise<I: Iterator> {
    previous: Option<I::Item>,
    underlying: I,
}

impl<I> Iterator for Pairwise<I>
where
    I: Iterator,
    I::Item: Copy,
{
    type Item = (I::Item, I::Item);

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.underlying.next();
        if let (Some(x), Some(y)) = (self.previous, next) {
            self.previous = next;
            return Some((x, y));
        }
        None
    }
}

pub trait IteratorExt: Iterator {
    fn pairwise(mut self) -> Pairwise<Self>
    where
        Self: Sized,
        Self::Item: Copy,
    {
        Pairwise {
            previous: self.next(),
            underlying: self,
        }
    }
}

impl<I: Iterator> IteratorExt for I {}
