use crate::RKPri;

//

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) struct PriLink<I>
{
    prev: Option<I>,
    next: Option<I>
}

impl<I> PriLink<I>
{
    pub(crate) const fn new() -> PriLink<I>
    {
        PriLink {
            prev: None,
            next: None
        }
    }
}

/// Storage of the nodes a `PriList` threads through
pub(crate) trait PriNodes<I>
{
    fn pri(&self, i: I) -> RKPri;
    fn link(&mut self, i: I) -> &mut PriLink<I>;
}

//

/// Priority-ordered doubly-linked list over node indices.
/// Higher priority sits nearer the head; equal priorities keep insertion order.
pub(crate) struct PriList<I>
{
    head: Option<I>,
    tail: Option<I>
}

impl<I> PriList<I>
where I: Copy + PartialEq
{
    pub(crate) const fn new() -> PriList<I>
    {
        PriList {
            head: None,
            tail: None
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool
    {
        self.head.is_none()
    }

    #[cfg(test)]
    pub(crate) fn head(&self) -> Option<I>
    {
        self.head
    }

    #[cfg(test)]
    pub(crate) fn tail(&self) -> Option<I>
    {
        self.tail
    }

    fn insert_before<N>(&mut self, nodes: &mut N, pos: Option<I>, i: I)
    where N: PriNodes<I>
    {
        let prev = match pos {
            Some(p) => nodes.link(p).prev,
            None => self.tail
        };

        *nodes.link(i) = PriLink {
            prev,
            next: pos
        };

        match prev {
            Some(p) => nodes.link(p).next = Some(i),
            None => self.head = Some(i)
        }
        match pos {
            Some(p) => nodes.link(p).prev = Some(i),
            None => self.tail = Some(i)
        }
    }

    fn first_where<N, F>(&self, nodes: &mut N, f: F) -> Option<I>
    where N: PriNodes<I>, F: Fn(RKPri) -> bool
    {
        let mut pos = self.head;

        while let Some(p) = pos {
            if f(nodes.pri(p)) {
                break;
            }
            pos = nodes.link(p).next;
        }

        pos
    }

    /// Inserts behind every node of the same or higher priority.
    pub(crate) fn enqueue_tail<N>(&mut self, nodes: &mut N, i: I)
    where N: PriNodes<I>
    {
        let pri = nodes.pri(i);
        let pos = self.first_where(nodes, |p| p < pri);

        self.insert_before(nodes, pos, i);
    }

    /// Inserts ahead of every node of the same or lower priority.
    pub(crate) fn enqueue_head<N>(&mut self, nodes: &mut N, i: I)
    where N: PriNodes<I>
    {
        let pri = nodes.pri(i);
        let pos = self.first_where(nodes, |p| p <= pri);

        self.insert_before(nodes, pos, i);
    }

    pub(crate) fn remove<N>(&mut self, nodes: &mut N, i: I)
    where N: PriNodes<I>
    {
        let PriLink { prev, next } = *nodes.link(i);

        match prev {
            Some(p) => nodes.link(p).next = next,
            None => self.head = next
        }
        match next {
            Some(n) => nodes.link(n).prev = prev,
            None => self.tail = prev
        }

        *nodes.link(i) = PriLink::new();
    }

    pub(crate) fn pop_head<N>(&mut self, nodes: &mut N) -> Option<I>
    where N: PriNodes<I>
    {
        let i = self.head?;
        self.remove(nodes, i);
        Some(i)
    }

    /// Moves a node to the place its current priority asks for.
    pub(crate) fn resort<N>(&mut self, nodes: &mut N, i: I)
    where N: PriNodes<I>
    {
        self.remove(nodes, i);
        self.enqueue_tail(nodes, i);
    }

    /// Priority of the head node, if any.
    pub(crate) fn head_pri<N>(&self, nodes: &N) -> Option<RKPri>
    where N: PriNodes<I>
    {
        self.head.map(|h| nodes.pri(h))
    }

    #[cfg(test)]
    pub(crate) fn contains<N>(&self, nodes: &mut N, i: I) -> bool
    where N: PriNodes<I>
    {
        self.first_index(nodes, |n| n == i).is_some()
    }

    #[cfg(test)]
    fn first_index<N, F>(&self, nodes: &mut N, f: F) -> Option<I>
    where N: PriNodes<I>, F: Fn(I) -> bool
    {
        let mut pos = self.head;

        while let Some(p) = pos {
            if f(p) {
                return Some(p);
            }
            pos = nodes.link(p).next;
        }

        None
    }

    /// Visits the nodes from head to tail.
    #[cfg(test)]
    pub(crate) fn for_each<N, F>(&self, nodes: &mut N, mut f: F)
    where N: PriNodes<I>, F: FnMut(I)
    {
        let mut pos = self.head;

        while let Some(p) = pos {
            pos = nodes.link(p).next;
            f(p);
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    struct Nodes
    {
        pri: [RKPri; 8],
        link: [PriLink<usize>; 8]
    }

    impl Nodes
    {
        fn new(pri: [RKPri; 8]) -> Nodes
        {
            Nodes {
                pri,
                link: [PriLink::new(); 8]
            }
        }
    }

    impl PriNodes<usize> for Nodes
    {
        fn pri(&self, i: usize) -> RKPri
        {
            self.pri[i]
        }

        fn link(&mut self, i: usize) -> &mut PriLink<usize>
        {
            &mut self.link[i]
        }
    }

    fn order(list: &PriList<usize>, nodes: &mut Nodes) -> [Option<usize>; 8]
    {
        let mut out = [None; 8];
        let mut n = 0;
        list.for_each(nodes, |i| {
            out[n] = Some(i);
            n += 1;
        });
        out
    }

    fn seq(ids: &[usize]) -> [Option<usize>; 8]
    {
        let mut out = [None; 8];
        for (o, &i) in out.iter_mut().zip(ids) {
            *o = Some(i);
        }
        out
    }

    #[test]
    fn tail_policy_keeps_fifo_within_band()
    {
        let mut nodes = Nodes::new([1, 5, 1, 5, 3, 0, 0, 0]);
        let mut list = PriList::new();

        for i in 0..5 {
            list.enqueue_tail(&mut nodes, i);
        }

        assert_eq!(order(&list, &mut nodes), seq(&[1, 3, 4, 0, 2]));
        assert_eq!(list.head_pri(&nodes), Some(5));
        assert_eq!(list.tail(), Some(2));
    }

    #[test]
    fn head_policy_goes_first_in_band()
    {
        let mut nodes = Nodes::new([1, 5, 1, 5, 3, 0, 0, 0]);
        let mut list = PriList::new();

        list.enqueue_tail(&mut nodes, 1);
        list.enqueue_tail(&mut nodes, 0);
        list.enqueue_tail(&mut nodes, 4);

        list.enqueue_head(&mut nodes, 3);
        list.enqueue_head(&mut nodes, 2);

        // 3 overtakes its equal 1, 2 overtakes its equal 0 but not 4
        assert_eq!(order(&list, &mut nodes), seq(&[3, 1, 4, 2, 0]));
    }

    #[test]
    fn remove_and_pop()
    {
        let mut nodes = Nodes::new([2, 2, 2, 2, 0, 0, 0, 0]);
        let mut list = PriList::new();

        for i in 0..4 {
            list.enqueue_tail(&mut nodes, i);
        }

        list.remove(&mut nodes, 2);
        assert!(!list.contains(&mut nodes, 2));
        list.remove(&mut nodes, 0);
        list.remove(&mut nodes, 3);

        assert_eq!(order(&list, &mut nodes), seq(&[1]));
        assert_eq!(list.pop_head(&mut nodes), Some(1));
        assert_eq!(list.pop_head(&mut nodes), None);
        assert!(list.is_empty());
        assert_eq!(list.tail(), None);
    }

    #[test]
    fn resort_after_priority_change()
    {
        let mut nodes = Nodes::new([4, 3, 2, 1, 0, 0, 0, 0]);
        let mut list = PriList::new();

        for i in 0..4 {
            list.enqueue_tail(&mut nodes, i);
        }

        nodes.pri[3] = 3;
        list.resort(&mut nodes, 3);
        assert_eq!(order(&list, &mut nodes), seq(&[0, 1, 3, 2]));

        nodes.pri[0] = 0;
        list.resort(&mut nodes, 0);
        assert_eq!(list.head(), Some(1));
        assert_eq!(list.tail(), Some(0));
    }
}
